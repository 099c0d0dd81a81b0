//! File-backed stand-in for a browser profile's push capability.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use base64::{URL_SAFE_NO_PAD, decode_config};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};
use web_push::SubscriptionInfo;

use crate::permission::{NotificationPermission, PermissionSignal};
use crate::ports::PushPlatform;
use crate::push::keys::{self, ApplicationServerKey};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to access profile {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("permission prompt failed: {0}")]
    Prompt(std::io::Error),
    #[error("failed to read profile: {0}")]
    Decode(#[from] toml::de::Error),
    #[error("failed to write profile: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("failed to generate subscription keys: {0}")]
    Keys(#[from] web_push::WebPushError),
    #[error("stored subscription key '{0}' is not valid base64")]
    CorruptKey(&'static str),
    #[error("failed to decrypt push message: {0}")]
    Decrypt(#[from] ece::Error),
    #[error("no push subscription in this profile")]
    NotSubscribed,
    #[error("NotSupportedError: push is not available in this profile")]
    Unsupported,
    #[error("NotAllowedError: notification permission has not been granted")]
    NotAllowed,
    #[error("InvalidStateError: a subscription with a different application server key exists")]
    KeyMismatch,
}

/// How an undecided permission request gets answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionPrompt {
    /// Ask on the terminal.
    #[default]
    Ask,
    Grant,
    Deny,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub notification: NotificationPermission,
    #[serde(default)]
    pub push: PermissionSignal,
    #[serde(default)]
    pub query: PermissionSignal,
}

impl Permissions {
    /// All three sources agreeing on one decision.
    pub fn decided(decision: NotificationPermission) -> Self {
        Self {
            notification: decision,
            push: decision.into(),
            query: decision.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredSubscription {
    endpoint: String,
    p256dh: String,
    auth: String,
    private_key: String,
    application_server_key: String,
}

impl StoredSubscription {
    fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo::new(&self.endpoint, &self.p256dh, &self.auth)
    }

    fn token(&self) -> Option<&str> {
        self.endpoint.rsplit('/').next().filter(|token| !token.is_empty())
    }

    fn decode(field: &'static str, value: &str) -> Result<Vec<u8>, ProfileError> {
        decode_config(value, URL_SAFE_NO_PAD).map_err(|_| ProfileError::CorruptKey(field))
    }

    /// Opens an `aes128gcm` message addressed to this subscription.
    fn decrypt(&self, body: &[u8]) -> Result<Vec<u8>, ProfileError> {
        let components = ece::EcKeyComponents::new(
            Self::decode("private_key", &self.private_key)?,
            Self::decode("p256dh", &self.p256dh)?,
        );
        let auth = Self::decode("auth", &self.auth)?;
        Ok(ece::decrypt(&components, &auth, body)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ProfileData {
    #[serde(default = "default_push_supported")]
    push_supported: bool,
    /// Declarative web push: the platform shows notifications itself and no
    /// delivery worker is installed.
    #[serde(default)]
    declarative_push: bool,
    #[serde(default)]
    permissions: Permissions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subscription: Option<StoredSubscription>,
}

fn default_push_supported() -> bool {
    true
}

impl Default for ProfileData {
    fn default() -> Self {
        Self {
            push_supported: true,
            declarative_push: false,
            permissions: Permissions::default(),
            subscription: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfilePlatform {
    path: Option<PathBuf>,
    endpoint_base: String,
    prompt: PermissionPrompt,
    data: Arc<Mutex<ProfileData>>,
}

impl ProfilePlatform {
    /// Loads the profile at `path`, starting empty when the file does not exist yet.
    pub fn load(
        path: &Path,
        endpoint_base: &str,
        prompt: PermissionPrompt,
    ) -> Result<Self, ProfileError> {
        let data = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => ProfileData::default(),
            Err(source) => {
                return Err(ProfileError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(Self::with_data(Some(path.to_path_buf()), endpoint_base, prompt, data))
    }

    /// Profile that is never written to disk.
    pub fn in_memory(endpoint_base: &str, prompt: PermissionPrompt) -> Self {
        Self::with_data(None, endpoint_base, prompt, ProfileData::default())
    }

    fn with_data(
        path: Option<PathBuf>,
        endpoint_base: &str,
        prompt: PermissionPrompt,
        data: ProfileData,
    ) -> Self {
        Self {
            path,
            endpoint_base: endpoint_base.trim_end_matches('/').to_string(),
            prompt,
            data: Arc::new(Mutex::new(data)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProfileData> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self) -> Result<(), ProfileError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = toml::to_string_pretty(&*self.lock())?;
        std::fs::write(path, contents).map_err(|source| ProfileError::Io {
            path: path.clone(),
            source,
        })
    }

    pub fn permissions(&self) -> Permissions {
        self.lock().permissions
    }

    pub fn set_permissions(&self, permissions: Permissions) -> Result<(), ProfileError> {
        self.lock().permissions = permissions;
        self.save()
    }

    pub fn set_push_supported(&self, supported: bool) -> Result<(), ProfileError> {
        self.lock().push_supported = supported;
        self.save()
    }

    pub fn declarative_push(&self) -> bool {
        self.lock().declarative_push
    }

    pub fn set_declarative_push(&self, declarative: bool) -> Result<(), ProfileError> {
        self.lock().declarative_push = declarative;
        self.save()
    }

    /// Decrypts an `aes128gcm` push body with the current subscription's keys.
    pub fn decrypt_push(&self, body: &[u8]) -> Result<Vec<u8>, ProfileError> {
        let stored = self
            .lock()
            .subscription
            .clone()
            .ok_or(ProfileError::NotSubscribed)?;
        stored.decrypt(body)
    }

    /// Whether `token` is the last path segment of the current subscription's endpoint.
    pub fn accepts_token(&self, token: &str) -> bool {
        self.lock()
            .subscription
            .as_ref()
            .and_then(StoredSubscription::token)
            .is_some_and(|current| current == token)
    }

    async fn ask_terminal(&self) -> Result<NotificationPermission, ProfileError> {
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(b"Allow notifications from this site? [y/N] ")
            .await
            .map_err(ProfileError::Prompt)?;
        stderr.flush().await.map_err(ProfileError::Prompt)?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(ProfileError::Prompt)?;
        Ok(match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => NotificationPermission::Granted,
            "n" | "no" => NotificationPermission::Denied,
            // Dismissed without an answer.
            _ => NotificationPermission::Default,
        })
    }
}

impl PushPlatform for ProfilePlatform {
    type Error = ProfileError;

    fn push_supported(&self) -> bool {
        self.lock().push_supported
    }

    async fn push_permission(&self, _key: &ApplicationServerKey) -> PermissionSignal {
        self.lock().permissions.push
    }

    fn notification_permission(&self) -> NotificationPermission {
        self.lock().permissions.notification
    }

    async fn query_permission(&self) -> PermissionSignal {
        self.lock().permissions.query
    }

    async fn request_permission(&self) -> Result<NotificationPermission, Self::Error> {
        let current = self.notification_permission();
        if current != NotificationPermission::Default {
            return Ok(current);
        }
        let decision = match self.prompt {
            PermissionPrompt::Grant => NotificationPermission::Granted,
            PermissionPrompt::Deny => NotificationPermission::Denied,
            PermissionPrompt::Ask => self.ask_terminal().await?,
        };
        if decision != NotificationPermission::Default {
            self.set_permissions(Permissions::decided(decision))?;
            info!(?decision, "notification permission decided");
        }
        Ok(decision)
    }

    async fn subscribe(&self, key: &ApplicationServerKey) -> Result<SubscriptionInfo, Self::Error> {
        let encoded_key = key.to_base64();
        {
            let data = self.lock();
            if !data.push_supported {
                return Err(ProfileError::Unsupported);
            }
            let permissions = data.permissions;
            if permissions.push != PermissionSignal::Granted
                && permissions.notification != NotificationPermission::Granted
            {
                return Err(ProfileError::NotAllowed);
            }
            if let Some(existing) = &data.subscription {
                if existing.application_server_key != encoded_key {
                    return Err(ProfileError::KeyMismatch);
                }
                return Ok(existing.info());
            }
        }

        let generated = keys::generate_subscription_keys()?;
        let token = keys::random_token(&mut OsRng);
        let stored = StoredSubscription {
            endpoint: format!("{}/{}", self.endpoint_base, token),
            p256dh: generated.p256dh,
            auth: generated.auth,
            private_key: generated.private_key,
            application_server_key: encoded_key,
        };
        let info = stored.info();
        self.lock().subscription = Some(stored);
        self.save()?;
        debug!(endpoint = %info.endpoint, "profile subscription created");
        Ok(info)
    }

    async fn get_subscription(&self) -> Result<Option<SubscriptionInfo>, Self::Error> {
        Ok(self.lock().subscription.as_ref().map(StoredSubscription::info))
    }

    async fn unsubscribe(&self) -> Result<bool, Self::Error> {
        let removed = self.lock().subscription.take().is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
pub(crate) mod tests {
    use super::*;
    use crate::push::keys::tests::test_key;
    use std::path::PathBuf;

    const ENDPOINT_BASE: &str = "http://127.0.0.1:3000/push";

    /// What the server's web-push sender puts on the wire for `subscription`.
    pub(crate) fn encrypt_for(subscription: &SubscriptionInfo, payload: &[u8]) -> Vec<u8> {
        let mut builder = web_push::WebPushMessageBuilder::new(subscription).expect("message builder");
        builder.set_payload(web_push::ContentEncoding::Aes128Gcm, payload);
        builder
            .build()
            .expect("build message")
            .payload
            .expect("payload")
            .content
    }

    fn create_temp_root(test_name: &str) -> PathBuf {
        let mut root = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        root.push(format!("kachi-push-{}-{}", test_name, nanos));
        std::fs::create_dir_all(&root).expect("create temp dir");
        root
    }

    #[tokio::test]
    async fn subscribe__should_require_granted_permission() {
        // Given
        let profile = ProfilePlatform::in_memory(ENDPOINT_BASE, PermissionPrompt::Deny);

        // When
        let result = profile.subscribe(&test_key()).await;

        // Then
        assert!(matches!(result, Err(ProfileError::NotAllowed)));
    }

    #[tokio::test]
    async fn request_permission__should_store_decision_in_all_sources() {
        // Given
        let profile = ProfilePlatform::in_memory(ENDPOINT_BASE, PermissionPrompt::Grant);

        // When
        let decision = profile.request_permission().await.expect("request");

        // Then
        assert_eq!(decision, NotificationPermission::Granted);
        assert_eq!(
            profile.permissions(),
            Permissions::decided(NotificationPermission::Granted)
        );
    }

    #[tokio::test]
    async fn request_permission__should_not_prompt_again_once_decided() {
        // Given
        let profile = ProfilePlatform::in_memory(ENDPOINT_BASE, PermissionPrompt::Grant);
        profile
            .set_permissions(Permissions::decided(NotificationPermission::Denied))
            .expect("set permissions");

        // When
        let decision = profile.request_permission().await.expect("request");

        // Then
        assert_eq!(decision, NotificationPermission::Denied);
    }

    #[tokio::test]
    async fn subscribe__should_reuse_subscription_for_same_key() {
        // Given
        let profile =
            ProfilePlatform::in_memory("http://127.0.0.1:3000/push/", PermissionPrompt::Grant);
        profile.request_permission().await.expect("request");

        // When
        let first = profile.subscribe(&test_key()).await.expect("first subscribe");
        let second = profile.subscribe(&test_key()).await.expect("second subscribe");

        // Then
        assert_eq!(first, second);
        assert!(first.endpoint.starts_with("http://127.0.0.1:3000/push/"));
        let token = first.endpoint.rsplit('/').next().expect("token");
        assert!(profile.accepts_token(token));
        assert!(!profile.accepts_token("someone-else"));
    }

    #[tokio::test]
    async fn subscribe__should_reject_different_application_key() {
        // Given
        let profile = ProfilePlatform::in_memory(ENDPOINT_BASE, PermissionPrompt::Grant);
        profile.request_permission().await.expect("request");
        profile.subscribe(&test_key()).await.expect("subscribe");
        let other_key = ApplicationServerKey::parse(
            "BJjhuoxyYxOSuhas5a4963ghNYYlJzAneDwWpPGhrQehZNUMS8qbYhOyvxmOL0gDzyVoPTmw8o59wT87aPyXUnQ",
        )
        .expect("other key");

        // When
        let result = profile.subscribe(&other_key).await;

        // Then
        assert!(matches!(result, Err(ProfileError::KeyMismatch)));
    }

    #[tokio::test]
    async fn subscribe__should_fail_when_push_is_unsupported() {
        // Given
        let profile = ProfilePlatform::in_memory(ENDPOINT_BASE, PermissionPrompt::Grant);
        profile
            .set_permissions(Permissions::decided(NotificationPermission::Granted))
            .expect("grant");
        profile.set_push_supported(false).expect("disable push");

        // When
        let result = profile.subscribe(&test_key()).await;

        // Then
        assert!(matches!(result, Err(ProfileError::Unsupported)));
        assert_eq!(
            crate::permission::resolve(&profile, &test_key()).await,
            crate::permission::PermissionState::Unavailable
        );
    }

    #[tokio::test]
    async fn decrypt_push__should_open_message_encrypted_for_subscription() {
        // Given
        let profile = ProfilePlatform::in_memory(ENDPOINT_BASE, PermissionPrompt::Grant);
        profile.request_permission().await.expect("request");
        let subscription = profile.subscribe(&test_key()).await.expect("subscribe");
        let body = encrypt_for(&subscription, br#"{"title":"Test","body":"It worked!"}"#);

        // When
        let plaintext = profile.decrypt_push(&body).expect("decrypt");

        // Then
        assert_eq!(plaintext, br#"{"title":"Test","body":"It worked!"}"#.to_vec());
        assert!(matches!(
            profile.decrypt_push(&body[..10]),
            Err(ProfileError::Decrypt(_))
        ));
    }

    #[test]
    fn decrypt_push__should_require_subscription() {
        // Given
        let profile = ProfilePlatform::in_memory(ENDPOINT_BASE, PermissionPrompt::Grant);

        // When
        let result = profile.decrypt_push(b"anything");

        // Then
        assert!(matches!(result, Err(ProfileError::NotSubscribed)));
    }

    #[tokio::test]
    async fn load__should_persist_subscription_and_permissions_across_loads() {
        // Given
        let root = create_temp_root("profile-persist");
        let path = root.join("profile.toml");
        let profile = ProfilePlatform::load(&path, ENDPOINT_BASE, PermissionPrompt::Grant)
            .expect("load empty profile");
        profile.request_permission().await.expect("request");
        let subscription = profile.subscribe(&test_key()).await.expect("subscribe");

        // When
        let reloaded = ProfilePlatform::load(&path, ENDPOINT_BASE, PermissionPrompt::Deny)
            .expect("reload profile");

        // Then
        assert_eq!(
            reloaded.get_subscription().await.expect("get subscription"),
            Some(subscription)
        );
        assert_eq!(
            reloaded.notification_permission(),
            NotificationPermission::Granted
        );

        assert!(reloaded.unsubscribe().await.expect("unsubscribe"));
        let emptied = ProfilePlatform::load(&path, ENDPOINT_BASE, PermissionPrompt::Deny)
            .expect("reload emptied profile");
        assert_eq!(emptied.get_subscription().await.expect("get subscription"), None);

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn load__should_read_divergent_permission_signals() {
        // Given
        let root = create_temp_root("profile-divergent");
        let path = root.join("profile.toml");
        std::fs::write(
            &path,
            concat!(
                "declarative_push = true\n",
                "\n",
                "[permissions]\n",
                "notification = \"default\"\n",
                "push = \"granted\"\n",
                "query = \"prompt\"\n",
            ),
        )
        .expect("write profile");

        // When
        let profile = ProfilePlatform::load(&path, ENDPOINT_BASE, PermissionPrompt::Ask)
            .expect("load profile");

        // Then
        let permissions = profile.permissions();
        assert_eq!(permissions.notification, NotificationPermission::Default);
        assert_eq!(permissions.push, PermissionSignal::Granted);
        assert!(profile.push_supported());
        assert!(profile.declarative_push());

        std::fs::remove_dir_all(&root).expect("cleanup");
    }
}
