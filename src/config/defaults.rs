//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [site] Section Defaults
// ============================================================================

pub mod site {
    pub fn host_name() -> String {
        "localhost".into()
    }
}

// ============================================================================
// [templates] Section Defaults
// ============================================================================

pub mod templates {
    use std::path::PathBuf;

    pub fn root() -> PathBuf {
        "templates".into()
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        5277
    }
}
