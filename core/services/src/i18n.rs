//! Translated user-facing strings.

use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

use bwcli_common::{Error, Result};

/// Locale used when none is stored or the stored one is unknown.
pub const DEFAULT_LOCALE: &str = "en";

const CATALOGS: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en.json")),
    ("de", include_str!("../locales/de.json")),
    ("fr", include_str!("../locales/fr.json")),
];

type Catalog = HashMap<String, String>;

fn parse_catalog(locale: &str) -> Result<Catalog> {
    let raw = CATALOGS
        .iter()
        .find(|(name, _)| *name == locale)
        .map(|(_, raw)| *raw)
        .ok_or_else(|| Error::NotFound(format!("No catalog for locale '{}'", locale)))?;
    serde_json::from_str(raw).map_err(|e| {
        Error::Serialization(format!("Catalog for locale '{}' is invalid: {}", locale, e))
    })
}

/// Pick the best supported locale: exact match, then language prefix
/// (`de-CH` → `de`), then the default.
fn resolve_locale(requested: Option<&str>) -> &'static str {
    let Some(requested) = requested.map(|r| r.trim().to_lowercase()) else {
        return DEFAULT_LOCALE;
    };
    let language = requested.split(['-', '_']).next().unwrap_or_default().to_string();
    CATALOGS
        .iter()
        .map(|(name, _)| *name)
        .find(|name| *name == requested)
        .or_else(|| CATALOGS.iter().map(|(name, _)| *name).find(|name| *name == language))
        .unwrap_or(DEFAULT_LOCALE)
}

struct Active {
    locale: &'static str,
    messages: Catalog,
}

/// String lookup with a fallback to the default locale.
pub struct I18nService {
    fallback: Catalog,
    active: RwLock<Active>,
}

impl I18nService {
    /// Create a service serving the default locale.
    pub fn new() -> Self {
        let fallback = parse_catalog(DEFAULT_LOCALE).unwrap_or_else(|e| {
            warn!("Default catalog unavailable, showing message keys: {}", e);
            Catalog::new()
        });
        Self {
            active: RwLock::new(Active {
                locale: DEFAULT_LOCALE,
                messages: fallback.clone(),
            }),
            fallback,
        }
    }

    /// Activate the best match for `locale`.
    pub fn init(&self, locale: Option<&str>) -> Result<()> {
        let resolved = resolve_locale(locale);
        if let Some(requested) = locale {
            if !requested.eq_ignore_ascii_case(resolved) {
                debug!(requested, resolved, "Locale resolved to supported catalog");
            }
        }
        let messages = parse_catalog(resolved)?;
        let mut active = self
            .active
            .write()
            .map_err(|_| Error::InvalidInput("Locale state poisoned".to_string()))?;
        *active = Active {
            locale: resolved,
            messages,
        };
        Ok(())
    }

    /// Active locale.
    pub fn locale(&self) -> &'static str {
        self.active
            .read()
            .map(|a| a.locale)
            .unwrap_or(DEFAULT_LOCALE)
    }

    /// Translate `key`, falling back to English and then to the key itself.
    pub fn t(&self, key: &str) -> String {
        let active = match self.active.read() {
            Ok(active) => active,
            Err(_) => {
                warn!("Locale state poisoned, using fallback catalog");
                return self.fallback.get(key).cloned().unwrap_or_else(|| key.to_string());
            }
        };
        active
            .messages
            .get(key)
            .or_else(|| self.fallback.get(key))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Translate `key` and substitute `{0}`.
    pub fn t_with(&self, key: &str, arg: &str) -> String {
        self.t(key).replace("{0}", arg)
    }
}

impl Default for I18nService {
    fn default() -> Self {
        Self::new()
    }
}
