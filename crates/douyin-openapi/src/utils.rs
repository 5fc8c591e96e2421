use std::sync::OnceLock;

use tracing::debug;

/// Number of leading characters kept when an identifier is logged.
pub const MASK_PREFIX_LEN: usize = 8;

/// Install the aws-lc-rs crypto provider for rustls exactly once per process.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Mask an identifier for logging, keeping only a short prefix.
pub fn mask(value: &str) -> String {
    match value.char_indices().nth(MASK_PREFIX_LEN) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_truncates_long_values() {
        assert_eq!(mask("1234567890abc"), "12345678...");
        assert_eq!(mask("short"), "short");
        assert_eq!(mask("用户标识符一二三四五"), "用户标识符一二三...");
    }
}
