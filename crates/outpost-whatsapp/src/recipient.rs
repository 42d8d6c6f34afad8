// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient address normalization.
//!
//! The gateway expects bare digits for individual contacts and the full JID
//! for groups. Conversations store whatever the provider sent us
//! (`5511999990000@s.whatsapp.net`, `+55 11 99999-0000`, ...).

use outpost_core::GatewayError;

const GROUP_SUFFIX: &str = "@g.us";

/// Reduce a stored remote address to the form the gateway accepts.
pub fn normalize_recipient(address: &str) -> Result<String, GatewayError> {
    let address = address.trim();
    if address.ends_with(GROUP_SUFFIX) && address.len() > GROUP_SUFFIX.len() {
        return Ok(address.to_string());
    }

    let local = address.split('@').next().unwrap_or_default();
    // Multi-device JIDs carry a `:device` suffix on the user part.
    let local = local.split(':').next().unwrap_or_default();
    let digits: String = local.chars().filter(char::is_ascii_digit).collect();

    if digits.is_empty() {
        Err(GatewayError::InvalidRecipient(address.to_string()))
    } else {
        Ok(digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_jid_domain() {
        assert_eq!(
            normalize_recipient("5511999990000@s.whatsapp.net").unwrap(),
            "5511999990000"
        );
    }

    #[test]
    fn strips_formatting() {
        assert_eq!(
            normalize_recipient(" +55 (11) 99999-0000 ").unwrap(),
            "5511999990000"
        );
    }

    #[test]
    fn strips_device_suffix() {
        assert_eq!(
            normalize_recipient("5511999990000:12@s.whatsapp.net").unwrap(),
            "5511999990000"
        );
    }

    #[test]
    fn group_jid_passes_through() {
        assert_eq!(
            normalize_recipient("120363025555555555@g.us").unwrap(),
            "120363025555555555@g.us"
        );
    }

    #[test]
    fn address_without_digits_is_rejected() {
        assert_eq!(
            normalize_recipient("someone@example.com"),
            Err(GatewayError::InvalidRecipient("someone@example.com".into()))
        );
        assert!(normalize_recipient("").is_err());
        assert!(normalize_recipient("@g.us").is_err());
    }

    proptest! {
        #[test]
        fn output_is_digits_or_group(input in "\\PC{0,40}") {
            if let Ok(out) = normalize_recipient(&input) {
                prop_assert!(
                    out.ends_with(GROUP_SUFFIX) || out.chars().all(|c| c.is_ascii_digit())
                );
                prop_assert!(!out.is_empty());
            }
        }

        #[test]
        fn normalization_is_idempotent(input in "[0-9 +()-]{1,20}(@s\\.whatsapp\\.net)?") {
            if let Ok(once) = normalize_recipient(&input) {
                prop_assert_eq!(normalize_recipient(&once).unwrap(), once);
            }
        }
    }
}
