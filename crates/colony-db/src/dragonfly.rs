//! `Dragonfly` (Redis-compatible) hot state cache.
//!
//! After each pass the engine publishes the values dashboards poll, so
//! display reads never touch `PostgreSQL`. The cache is never read back by
//! the settlement engine; losing it loses nothing.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `colony:cycle` | Integer | Most recent settled cycle id |
//! | `colony:phenomenon` | JSON | Current phenomenon state |
//! | `colony:pass:last` | JSON | Summary of the most recent pass |

use fred::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;

use colony_types::PhenomenonState;

use crate::error::DbError;

/// Most recent settled cycle id.
pub const CYCLE_KEY: &str = "colony:cycle";

/// Current phenomenon state.
pub const PHENOMENON_KEY: &str = "colony:phenomenon";

/// Summary of the most recent pass.
pub const LAST_PASS_KEY: &str = "colony:pass:last";

/// Connection handle to a `Dragonfly` instance.
#[derive(Clone)]
pub struct HotStateCache {
    client: Client,
}

impl HotStateCache {
    /// Connect to `Dragonfly` at a `redis://host:port[/db]` URL.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed and
    /// [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Serialize `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] or [`DbError::Dragonfly`].
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.set(key, json.as_str(), None, None, false).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize it from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if the key does not exist.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value.map_or_else(
            || Err(DbError::KeyNotFound(key.to_owned())),
            |s| Ok(serde_json::from_str(&s)?),
        )
    }

    /// Publish the most recent settled cycle id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_cycle(&self, cycle_id: u64) -> Result<(), DbError> {
        let _: () = self
            .client
            .set(CYCLE_KEY, cycle_id.to_string().as_str(), None, None, false)
            .await?;
        Ok(())
    }

    /// Read the most recent settled cycle id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if nothing was published yet.
    pub async fn get_cycle(&self) -> Result<u64, DbError> {
        let value: Option<String> = self.client.get(CYCLE_KEY).await?;
        value.map_or_else(
            || Err(DbError::KeyNotFound(CYCLE_KEY.to_owned())),
            |s| {
                s.parse::<u64>()
                    .map_err(|e| DbError::Config(format!("{CYCLE_KEY} is not a valid u64: {e}")))
            },
        )
    }

    /// Publish the phenomenon state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the write fails.
    pub async fn set_phenomenon(&self, state: &PhenomenonState) -> Result<(), DbError> {
        self.set_json(PHENOMENON_KEY, state).await
    }

    /// Read the published phenomenon state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if missing, undecodable, or the read fails.
    pub async fn get_phenomenon(&self) -> Result<PhenomenonState, DbError> {
        self.get_json(PHENOMENON_KEY).await
    }

    /// Publish a pass summary along with its cycle id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or either write fails.
    pub async fn set_last_pass<T: Serialize + Sync>(&self, cycle_id: u64, report: &T) -> Result<(), DbError> {
        self.set_json(LAST_PASS_KEY, report).await?;
        self.set_cycle(cycle_id).await
    }

    /// Read the published pass summary.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if missing, undecodable, or the read fails.
    pub async fn get_last_pass<T: DeserializeOwned>(&self) -> Result<T, DbError> {
        self.get_json(LAST_PASS_KEY).await
    }

    /// Delete every `colony:*` key this cache writes.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn clear(&self) -> Result<(), DbError> {
        let _: u32 = self
            .client
            .del(vec![CYCLE_KEY, PHENOMENON_KEY, LAST_PASS_KEY])
            .await?;
        Ok(())
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the quit command fails.
    pub async fn quit(&self) -> Result<(), DbError> {
        self.client.quit().await?;
        tracing::info!("Dragonfly connection closed");
        Ok(())
    }
}
