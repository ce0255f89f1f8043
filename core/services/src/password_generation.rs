//! Password generator with per-installation options and an encrypted
//! history of generated values.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use bwcli_common::{Error, Result};
use bwcli_crypto::EncString;
use bwcli_storage::{StorageExt, StorageService};

use crate::constants::{GENERATED_PASSWORD_HISTORY_KEY, PASSWORD_GENERATION_OPTIONS_KEY};
use crate::crypto::CryptoService;
use crate::policy::{PolicyService, PASSWORD_GENERATOR_POLICY};

/// Most recent generated passwords kept in the history.
pub const MAX_HISTORY: usize = 100;

/// Longest password the generator produces.
pub const MAX_LENGTH: usize = 128;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const NUMBERS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*";
const AMBIGUOUS: &[u8] = b"IOlo01";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordGenerationOptions {
    pub length: usize,
    pub uppercase: bool,
    pub lowercase: bool,
    pub number: bool,
    pub special: bool,
    pub min_number: usize,
    pub min_special: usize,
    /// Allow characters that are easy to confuse, such as `l` and `1`.
    pub ambiguous: bool,
}

impl Default for PasswordGenerationOptions {
    fn default() -> Self {
        Self {
            length: 14,
            uppercase: true,
            lowercase: true,
            number: true,
            special: false,
            min_number: 1,
            min_special: 1,
            ambiguous: false,
        }
    }
}

/// Generator constraints set by an organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeneratorPolicy {
    min_length: usize,
    use_upper: bool,
    use_lower: bool,
    use_numbers: bool,
    use_special: bool,
    min_numbers: usize,
    min_special: usize,
}

impl GeneratorPolicy {
    fn merge(mut self, other: GeneratorPolicy) -> Self {
        self.min_length = self.min_length.max(other.min_length);
        self.use_upper |= other.use_upper;
        self.use_lower |= other.use_lower;
        self.use_numbers |= other.use_numbers;
        self.use_special |= other.use_special;
        self.min_numbers = self.min_numbers.max(other.min_numbers);
        self.min_special = self.min_special.max(other.min_special);
        self
    }

    fn apply(&self, options: &mut PasswordGenerationOptions) {
        options.length = options.length.max(self.min_length.min(MAX_LENGTH));
        options.uppercase |= self.use_upper;
        options.lowercase |= self.use_lower;
        options.number |= self.use_numbers;
        options.special |= self.use_special;
        options.min_number = options.min_number.max(self.min_numbers);
        options.min_special = options.min_special.max(self.min_special);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntry {
    password: EncString,
    date: DateTime<Utc>,
}

/// A decrypted history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPassword {
    pub password: String,
    pub date: DateTime<Utc>,
}

pub struct PasswordGenerationService {
    storage: Arc<dyn StorageService>,
    crypto: Arc<CryptoService>,
    policies: Arc<PolicyService>,
    options: RwLock<Option<PasswordGenerationOptions>>,
    history: RwLock<Option<Vec<HistoryEntry>>>,
}

impl PasswordGenerationService {
    pub fn new(
        storage: Arc<dyn StorageService>,
        crypto: Arc<CryptoService>,
        policies: Arc<PolicyService>,
    ) -> Self {
        Self {
            storage,
            crypto,
            policies,
            options: RwLock::new(None),
            history: RwLock::new(None),
        }
    }

    /// Saved options, with organization policies applied.
    pub async fn get_options(&self) -> Result<PasswordGenerationOptions> {
        let saved = self.options.read().await.clone();
        let mut options = match saved {
            Some(options) => options,
            None => {
                let loaded: PasswordGenerationOptions = self
                    .storage
                    .get_as(PASSWORD_GENERATION_OPTIONS_KEY)
                    .await?
                    .unwrap_or_default();
                *self.options.write().await = Some(loaded.clone());
                loaded
            }
        };
        self.enforce_policies(&mut options).await?;
        Ok(options)
    }

    pub async fn save_options(&self, options: &PasswordGenerationOptions) -> Result<()> {
        let mut slot = self.options.write().await;
        self.storage
            .save_as(PASSWORD_GENERATION_OPTIONS_KEY, options)
            .await?;
        *slot = Some(options.clone());
        Ok(())
    }

    /// Raise `options` to what the enabled generator policies require.
    pub async fn enforce_policies(&self, options: &mut PasswordGenerationOptions) -> Result<()> {
        let policy = self
            .policies
            .get_by_type(PASSWORD_GENERATOR_POLICY)
            .await?
            .into_iter()
            .filter_map(|p| p.data)
            .filter_map(|data| serde_json::from_value::<GeneratorPolicy>(data).ok())
            .fold(GeneratorPolicy::default(), GeneratorPolicy::merge);
        policy.apply(options);
        Ok(())
    }

    /// Generate a password and record it in the history.
    pub async fn generate(&self, options: &PasswordGenerationOptions) -> Result<String> {
        let password = generate_password(options)?;
        self.add_history(&password).await?;
        Ok(password)
    }

    /// Record a generated password. Skipped while the vault is locked.
    async fn add_history(&self, password: &str) -> Result<()> {
        if !self.crypto.has_key().await? {
            debug!("Vault locked, generated password not recorded");
            return Ok(());
        }

        let entry = HistoryEntry {
            password: self.crypto.encrypt(password.as_bytes()).await?,
            date: Utc::now(),
        };

        let mut slot = self.history.write().await;
        let mut history = match slot.take() {
            Some(history) => history,
            None => self
                .storage
                .get_as(GENERATED_PASSWORD_HISTORY_KEY)
                .await?
                .unwrap_or_default(),
        };
        history.insert(0, entry);
        history.truncate(MAX_HISTORY);
        self.storage
            .save_as(GENERATED_PASSWORD_HISTORY_KEY, &history)
            .await?;
        *slot = Some(history);
        Ok(())
    }

    /// Decrypted history, newest first.
    pub async fn get_history(&self) -> Result<Vec<GeneratedPassword>> {
        let cached = self.history.read().await.clone();
        let history: Vec<HistoryEntry> = match cached {
            Some(history) => history,
            None => self
                .storage
                .get_as(GENERATED_PASSWORD_HISTORY_KEY)
                .await?
                .unwrap_or_default(),
        };

        let mut entries = Vec::with_capacity(history.len());
        for entry in history {
            let plaintext = self.crypto.decrypt(&entry.password).await?;
            let password = String::from_utf8(plaintext)
                .map_err(|e| Error::Serialization(format!("Invalid history entry: {}", e)))?;
            entries.push(GeneratedPassword {
                password,
                date: entry.date,
            });
        }
        Ok(entries)
    }

    /// Forget the history and cached options. Saved options stay on disk.
    pub async fn clear(&self) -> Result<()> {
        let mut options = self.options.write().await;
        let mut history = self.history.write().await;
        *options = None;
        *history = None;
        self.storage.remove(GENERATED_PASSWORD_HISTORY_KEY).await
    }
}

/// Build a random password satisfying `options`.
///
/// # Errors
/// - `Error::InvalidInput` if no character set is enabled, the length is
///   above [`MAX_LENGTH`], or the minimums exceed the length
pub fn generate_password(options: &PasswordGenerationOptions) -> Result<String> {
    if options.length > MAX_LENGTH {
        return Err(Error::InvalidInput(format!(
            "Length {} exceeds the maximum of {}",
            options.length, MAX_LENGTH
        )));
    }

    let filter = |set: &[u8]| -> Vec<u8> {
        set.iter()
            .copied()
            .filter(|c| options.ambiguous || !AMBIGUOUS.contains(c))
            .collect()
    };

    let mut sets: Vec<Vec<u8>> = Vec::new();
    let mut required: Vec<(usize, usize)> = Vec::new();
    if options.uppercase {
        sets.push(filter(UPPERCASE));
        required.push((sets.len() - 1, 1));
    }
    if options.lowercase {
        sets.push(filter(LOWERCASE));
        required.push((sets.len() - 1, 1));
    }
    if options.number {
        sets.push(filter(NUMBERS));
        required.push((sets.len() - 1, options.min_number.max(1)));
    }
    if options.special {
        sets.push(SPECIAL.to_vec());
        required.push((sets.len() - 1, options.min_special.max(1)));
    }

    if sets.is_empty() {
        return Err(Error::InvalidInput(
            "At least one character set must be enabled".to_string(),
        ));
    }
    let minimum = required
        .iter()
        .try_fold(0usize, |acc, (_, n)| acc.checked_add(*n))
        .ok_or_else(|| {
            Error::InvalidInput("Required character counts are too large".to_string())
        })?;
    if options.length < minimum {
        return Err(Error::InvalidInput(format!(
            "Length {} is shorter than the {} required characters",
            options.length, minimum
        )));
    }

    let all: Vec<u8> = sets.iter().flatten().copied().collect();
    let mut rng = rand::thread_rng();
    let mut chars = Vec::with_capacity(options.length);
    for (set, count) in required {
        for _ in 0..count {
            chars.push(sets[set][rng.gen_range(0..sets[set].len())]);
        }
    }
    while chars.len() < options.length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    Ok(chars.into_iter().map(char::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenService;
    use crate::user::UserService;
    use bwcli_api::PolicyRecord;
    use bwcli_common::{MemorySessionEnv, UserId};
    use bwcli_crypto::{KdfParams, SymmetricKey};
    use bwcli_storage::{MemoryStorage, SecureStorage, SessionCipher};

    struct Fixture {
        storage: Arc<MemoryStorage>,
        crypto: Arc<CryptoService>,
        policies: Arc<PolicyService>,
        generator: PasswordGenerationService,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let env = Arc::new(MemorySessionEnv::with_value(SymmetricKey::generate().to_base64()));
        let cipher: Arc<dyn SessionCipher> = Arc::new(CryptoService::new(
            storage.clone(),
            Arc::new(MemoryStorage::new()),
        ));
        let secure = Arc::new(SecureStorage::new(
            storage.clone(),
            env,
            Box::new(move || Some(cipher.clone())),
        ));
        let crypto = Arc::new(CryptoService::new(storage.clone(), secure));
        let user = Arc::new(UserService::new(
            storage.clone(),
            Arc::new(TokenService::new(storage.clone())),
        ));
        user.set_information(UserId::new("u1").unwrap(), "u@example.com", &KdfParams::moderate())
            .await
            .unwrap();
        let policies = Arc::new(PolicyService::new(storage.clone(), user));
        let generator =
            PasswordGenerationService::new(storage.clone(), crypto.clone(), policies.clone());
        Fixture {
            storage,
            crypto,
            policies,
            generator,
        }
    }

    #[test]
    fn test_generate_respects_character_sets() {
        let options = PasswordGenerationOptions {
            length: 20,
            uppercase: false,
            lowercase: false,
            number: true,
            special: false,
            ..Default::default()
        };
        let password = generate_password(&options).unwrap();
        assert_eq!(password.len(), 20);
        assert!(password.chars().all(|c| c.is_ascii_digit()));
        assert!(!password.contains('0') && !password.contains('1'));
    }

    #[test]
    fn test_generate_meets_minimums() {
        let options = PasswordGenerationOptions {
            length: 8,
            special: true,
            min_number: 3,
            min_special: 3,
            ..Default::default()
        };
        let password = generate_password(&options).unwrap();
        assert!(password.chars().filter(|c| c.is_ascii_digit()).count() >= 3);
        assert!(password.bytes().filter(|c| SPECIAL.contains(c)).count() >= 3);
    }

    #[test]
    fn test_generate_rejects_impossible_options() {
        let none = PasswordGenerationOptions {
            uppercase: false,
            lowercase: false,
            number: false,
            special: false,
            ..Default::default()
        };
        assert!(matches!(
            generate_password(&none),
            Err(Error::InvalidInput(_))
        ));

        let short = PasswordGenerationOptions {
            length: 2,
            ..Default::default()
        };
        assert!(generate_password(&short).is_err());
    }

    #[test]
    fn test_generate_rejects_oversized_length() {
        let huge = PasswordGenerationOptions {
            length: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(
            generate_password(&huge),
            Err(Error::InvalidInput(_))
        ));

        let longest = PasswordGenerationOptions {
            length: MAX_LENGTH,
            ..Default::default()
        };
        assert_eq!(generate_password(&longest).unwrap().len(), MAX_LENGTH);
    }

    #[test]
    fn test_generate_rejects_overflowing_minimums() {
        let options = PasswordGenerationOptions {
            special: true,
            min_number: usize::MAX,
            min_special: 2,
            ..Default::default()
        };
        assert!(matches!(
            generate_password(&options),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_history_is_encrypted_and_capped() {
        let f = fixture().await;
        f.crypto.set_key(SymmetricKey::generate()).await.unwrap();
        let options = PasswordGenerationOptions::default();

        let mut last = String::new();
        for _ in 0..MAX_HISTORY + 5 {
            last = f.generator.generate(&options).await.unwrap();
        }

        let raw = f
            .storage
            .get(GENERATED_PASSWORD_HISTORY_KEY)
            .await
            .unwrap()
            .unwrap();
        assert!(!raw.to_string().contains(&last));

        let history = f.generator.get_history().await.unwrap();
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[0].password, last);
    }

    #[tokio::test]
    async fn test_history_skipped_while_locked() {
        let f = fixture().await;
        f.generator
            .generate(&PasswordGenerationOptions::default())
            .await
            .unwrap();
        assert!(!f.storage.contains(GENERATED_PASSWORD_HISTORY_KEY).await);
    }

    #[tokio::test]
    async fn test_policy_raises_minimum_length() {
        let f = fixture().await;
        f.policies
            .replace(vec![PolicyRecord {
                id: "p1".to_string(),
                organization_id: "o1".to_string(),
                policy_type: PASSWORD_GENERATOR_POLICY.to_string(),
                enabled: true,
                data: Some(serde_json::json!({ "minLength": 30, "useSpecial": true })),
            }])
            .await
            .unwrap();

        let options = f.generator.get_options().await.unwrap();
        assert_eq!(options.length, 30);
        assert!(options.special);
    }

    #[tokio::test]
    async fn test_policy_minimum_length_is_capped() {
        let f = fixture().await;
        f.policies
            .replace(vec![PolicyRecord {
                id: "p1".to_string(),
                organization_id: "o1".to_string(),
                policy_type: PASSWORD_GENERATOR_POLICY.to_string(),
                enabled: true,
                data: Some(serde_json::json!({ "minLength": 100000 })),
            }])
            .await
            .unwrap();

        let options = f.generator.get_options().await.unwrap();
        assert_eq!(options.length, MAX_LENGTH);
        assert!(generate_password(&options).is_ok());
    }

    #[tokio::test]
    async fn test_clear_removes_history() {
        let f = fixture().await;
        f.crypto.set_key(SymmetricKey::generate()).await.unwrap();
        f.generator
            .generate(&PasswordGenerationOptions::default())
            .await
            .unwrap();

        f.generator.clear().await.unwrap();
        f.generator.clear().await.unwrap();
        assert!(!f.storage.contains(GENERATED_PASSWORD_HISTORY_KEY).await);
        assert!(f.generator.get_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_saved_options_survive_clear() {
        let f = fixture().await;
        let options = PasswordGenerationOptions {
            length: 24,
            special: true,
            ..Default::default()
        };
        f.generator.save_options(&options).await.unwrap();

        let reloaded =
            PasswordGenerationService::new(f.storage.clone(), f.crypto.clone(), f.policies.clone());
        let loaded = reloaded.get_options().await.unwrap();
        assert_eq!(loaded.length, 24);
        assert!(loaded.special);

        reloaded.clear().await.unwrap();
        assert_eq!(reloaded.get_options().await.unwrap().length, 24);
    }
}
