//! Provider catalogue types

use super::field::FieldSchema;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every provider this crate can deliver through.
///
/// This is the closed set of provider types: a connection's `provider_type`
/// string must parse into exactly one of these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gmail,
    Mailgun,
    Netcore,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Gmail, Self::Mailgun, Self::Netcore];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Mailgun => "mailgun",
            Self::Netcore => "netcore",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmail" => Ok(Self::Gmail),
            "mailgun" => Ok(Self::Mailgun),
            "netcore" => Ok(Self::Netcore),
            other => Err(AppError::invalid_field(
                "provider_type",
                format!("unknown provider type '{}'", other),
            )),
        }
    }
}

/// Availability tier shown next to a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTier {
    Free,
    Soon,
}

/// Static description of a provider, used to render its configuration form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderOptions {
    pub title: &'static str,
    pub description: &'static str,
    pub fields: FieldSchema,
    pub icon: &'static str,
    pub display_name: &'static str,
    pub provider_type: ProviderTier,
    pub field_order: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("mailgun".parse::<ProviderKind>().unwrap(), ProviderKind::Mailgun);
        assert_eq!(" Gmail ".parse::<ProviderKind>().unwrap(), ProviderKind::Gmail);
        assert_eq!("NETCORE".parse::<ProviderKind>().unwrap(), ProviderKind::Netcore);
    }

    #[test]
    fn test_provider_kind_unknown() {
        let err = "sendgrid".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidConfiguration { ref field_name, .. } if field_name == "provider_type"
        ));
    }

    #[test]
    fn test_provider_kind_roundtrip_through_display() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_provider_kind_serde() {
        let json = serde_json::to_string(&ProviderKind::Mailgun).unwrap();
        assert_eq!(json, "\"mailgun\"");
    }
}
