//! Operator-facing rendering of property values.

use crate::core::property::{PropertyDescriptor, PropertyKey, PropertyValue};
use crate::core::state::ConfigurationState;

pub const UNSET_STRING: &str = "(Not Set)";
pub const EMPTY_LIST_STRING: &str = "(Empty list, to be entered manually later)";

/// Mask all but the first and last character of a secret.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => String::new(),
        1 => "*".to_string(),
        len => {
            let mut masked = String::with_capacity(len);
            masked.push(chars[0]);
            masked.extend(std::iter::repeat_n('*', len - 2));
            masked.push(chars[len - 1]);
            masked
        }
    }
}

pub fn list_to_string(items: Option<&[String]>) -> String {
    match items {
        None => UNSET_STRING.to_string(),
        Some([]) => EMPTY_LIST_STRING.to_string(),
        Some(items) => format!("({})", items.join(", ")),
    }
}

/// Whether the remote check guarding a secret property has succeeded.
pub fn is_validated(state: &ConfigurationState, key: PropertyKey) -> bool {
    match key {
        PropertyKey::AwsSecretKey => state.aws_account_id.is_some(),
        PropertyKey::ApiKey => state.api_key_validated,
        _ => false,
    }
}

/// Render a property for menus and listings. Secrets are never shown in plaintext.
pub fn display_value(descriptor: &PropertyDescriptor, state: &ConfigurationState) -> String {
    let Some(value) = state.get(descriptor.key) else {
        return UNSET_STRING.to_string();
    };
    match value {
        PropertyValue::Text(text) if descriptor.secret => {
            let suffix = if is_validated(state, descriptor.key) {
                "(validated)"
            } else {
                "(unvalidated)"
            };
            format!("{} {}", mask_secret(text), suffix)
        }
        PropertyValue::Text(text) => text.clone(),
        PropertyValue::List(items) => list_to_string(Some(items)),
        PropertyValue::Flag(flag) => if *flag { "yes" } else { "no" }.to_string(),
        PropertyValue::Timestamp(at) => at.to_rfc3339(),
    }
}

/// Numbered menu lines for every prompted property.
pub fn property_choices<'a>(
    descriptors: impl Iterator<Item = &'a PropertyDescriptor>,
    state: &ConfigurationState,
) -> Vec<String> {
    descriptors
        .enumerate()
        .map(|(index, descriptor)| {
            format!(
                "{}. {}: {}",
                index + 1,
                descriptor.label,
                display_value(descriptor, state)
            )
        })
        .collect()
}
