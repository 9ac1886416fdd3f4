use std::env;

use crate::error::{CaptureError, Result};

pub const ENV_REF_ALL_RESOURCES: &str = "AERO_CAPTURE_REF_ALL_RESOURCES";
pub const ENV_SAVE_ALL_INITIALS: &str = "AERO_CAPTURE_SAVE_ALL_INITIALS";
pub const ENV_VERIFY_SHADOW_STORAGE: &str = "AERO_CAPTURE_VERIFY_SHADOW_STORAGE";

/// Capture-wide knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Treat every serialisable record as a resolution root, not just those referenced in the
    /// captured frame.
    pub ref_all_resources: bool,
    /// Snapshot initial contents of every resource that supports it, dirty or not.
    pub save_all_initials: bool,
    /// Check shadow guards at finalization and fail the capture on corruption.
    pub verify_shadow_storage: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            ref_all_resources: false,
            save_all_initials: false,
            verify_shadow_storage: true,
        }
    }
}

impl CaptureOptions {
    /// Defaults overridden by `AERO_CAPTURE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`CaptureOptions::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();
        let fields: [(&'static str, &mut bool); 3] = [
            (ENV_REF_ALL_RESOURCES, &mut options.ref_all_resources),
            (ENV_SAVE_ALL_INITIALS, &mut options.save_all_initials),
            (ENV_VERIFY_SHADOW_STORAGE, &mut options.verify_shadow_storage),
        ];
        for (name, field) in fields {
            if let Some(value) = lookup(name) {
                *field = parse_bool(name, &value)?;
            }
        }
        Ok(options)
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(CaptureError::InvalidOption {
            name,
            value: value.to_string(),
        }),
    }
}
