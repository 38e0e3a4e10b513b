//! Block-height-gated caches for chain state
//!
//! Oracle module params and the validator's jail status change rarely, so
//! the engine refreshes them every N blocks instead of every tick. Both
//! caches also refresh on first use.

use crate::chain::OracleParams;

/// Param refresh interval, in blocks
pub const PARAM_REFRESH_INTERVAL: i64 = 200;

/// Jail-status refresh interval, in blocks
pub const JAIL_REFRESH_INTERVAL: i64 = 50;

#[derive(Debug, Default)]
pub struct ParamCache {
    params: Option<OracleParams>,
    last_refresh_height: i64,
}

impl ParamCache {
    pub fn needs_refresh(&self, height: i64) -> bool {
        self.params.is_none() || height - self.last_refresh_height >= PARAM_REFRESH_INTERVAL
    }

    pub fn update(&mut self, height: i64, params: OracleParams) {
        self.params = Some(params);
        self.last_refresh_height = height;
    }

    pub fn params(&self) -> Option<&OracleParams> {
        self.params.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct JailCache {
    is_jailed: bool,
    last_refresh_height: Option<i64>,
}

impl JailCache {
    pub fn needs_refresh(&self, height: i64) -> bool {
        match self.last_refresh_height {
            None => true,
            Some(last) => height - last >= JAIL_REFRESH_INTERVAL,
        }
    }

    pub fn update(&mut self, height: i64, is_jailed: bool) {
        self.is_jailed = is_jailed;
        self.last_refresh_height = Some(height);
    }

    pub fn is_jailed(&self) -> bool {
        self.is_jailed
    }
}
