//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into core
//! services, rather than read from process-wide environment variables during
//! request handling.

use crate::{TvsError, TvsResult};
use sctid::Namespace;

/// The SNOMED CT core module. Used when a write request does not name one.
pub const CORE_MODULE_ID: &str = "900000000000207008";

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    default_namespace: Option<Namespace>,
    default_module_id: String,
}

impl Default for CoreConfig {
    /// International-edition defaults: short-form identifiers, core module.
    fn default() -> Self {
        Self {
            default_namespace: None,
            default_module_id: CORE_MODULE_ID.to_owned(),
        }
    }
}

impl CoreConfig {
    pub fn new(
        default_namespace: Option<Namespace>,
        default_module_id: String,
    ) -> TvsResult<Self> {
        if default_module_id.trim().is_empty() {
            return Err(TvsError::InvalidInput(
                "default_module_id cannot be empty".into(),
            ));
        }

        Ok(Self {
            default_namespace,
            default_module_id,
        })
    }

    /// Namespace newly generated identifiers belong to; `None` means the
    /// short (International) format.
    pub fn default_namespace(&self) -> Option<Namespace> {
        self.default_namespace
    }

    pub fn default_module_id(&self) -> &str {
        &self.default_module_id
    }
}

/// Parse a namespace from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns `None` (short format).
pub fn namespace_from_env_value(value: Option<String>) -> TvsResult<Option<Namespace>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    match value {
        None => Ok(None),
        Some(raw) => {
            let parsed: u32 = raw
                .parse()
                .map_err(|_| TvsError::InvalidInput(format!("invalid namespace '{raw}'")))?;
            Ok(Some(Namespace::new(parsed)?))
        }
    }
}
