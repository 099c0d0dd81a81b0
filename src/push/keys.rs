use base64::{URL_SAFE_NO_PAD, decode_config, encode_config};
use jwt_simple::prelude::ES256KeyPair;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

const UNCOMPRESSED_P256_LEN: usize = 65;
const AUTH_SECRET_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("application server key is not valid base64: {0}")]
    Encoding(String),
    #[error("application server key must be an uncompressed P-256 point ({0} bytes given)")]
    Shape(usize),
}

/// VAPID public key the server signs its pushes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationServerKey {
    bytes: Vec<u8>,
}

impl ApplicationServerKey {
    /// Accepts url-safe or standard base64, with or without padding.
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|ch| *ch != '=')
            .map(|ch| match ch {
                '+' => '-',
                '/' => '_',
                other => other,
            })
            .collect();
        let bytes = decode_config(&normalized, URL_SAFE_NO_PAD)
            .map_err(|err| KeyError::Encoding(err.to_string()))?;
        if bytes.len() != UNCOMPRESSED_P256_LEN || bytes[0] != 0x04 {
            return Err(KeyError::Shape(bytes.len()));
        }
        Ok(Self { bytes })
    }

    /// Reads the key from a page's `<meta name="vapid-public-key">` tag.
    pub fn from_html(html: &str) -> Option<Result<Self, KeyError>> {
        find_meta_content(html, "vapid-public-key").map(|raw| Self::parse(&raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_base64(&self) -> String {
        encode_config(&self.bytes, URL_SAFE_NO_PAD)
    }
}

fn find_meta_content(html: &str, name: &str) -> Option<String> {
    let doc = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("meta").ok()?;
    doc.select(&selector)
        .filter(|el| {
            el.value()
                .attr("name")
                .is_some_and(|value| value.eq_ignore_ascii_case(name))
        })
        .find_map(|el| {
            let content = el.value().attr("content")?.trim();
            (!content.is_empty()).then(|| content.to_string())
        })
}

/// Key material a browser generates for a new push subscription.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionKeys {
    pub(crate) private_key: String,
    pub(crate) p256dh: String,
    pub(crate) auth: String,
}

pub(crate) fn generate_subscription_keys() -> Result<SubscriptionKeys, web_push::WebPushError> {
    let mut rng = OsRng;
    generate_subscription_keys_with_rng(&mut rng)
}

pub(crate) fn generate_subscription_keys_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<SubscriptionKeys, web_push::WebPushError> {
    let key_pair = generate_es256_keypair_with_rng(rng);
    let private_key = encode_config(key_pair.to_bytes(), URL_SAFE_NO_PAD);
    let public_key =
        web_push::VapidSignatureBuilder::from_base64_no_sub(&private_key, URL_SAFE_NO_PAD)?
            .get_public_key();
    let mut auth = [0u8; AUTH_SECRET_LEN];
    rng.fill_bytes(&mut auth);

    Ok(SubscriptionKeys {
        private_key,
        p256dh: encode_config(public_key, URL_SAFE_NO_PAD),
        auth: encode_config(auth, URL_SAFE_NO_PAD),
    })
}

pub(crate) fn random_token<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 18];
    rng.fill_bytes(&mut bytes);
    encode_config(bytes, URL_SAFE_NO_PAD)
}

fn generate_es256_keypair_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
pub(crate) mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    pub(crate) const TEST_KEY: &str =
        "BCRweRf_U5iQM4pKNucGRzM6OuLp8Hisa8yX0N2ePIf1oxKitvFT6qvuGgYoTxlMatMDaytXbZR3rVClc2w_p6U";

    pub(crate) fn test_key() -> ApplicationServerKey {
        ApplicationServerKey::parse(TEST_KEY).expect("test key")
    }

    #[test]
    fn generate_subscription_keys_with_rng__should_return_expected_fixture() {
        // Given
        let seed = [7u8; 32];
        let mut rng = StdRng::from_seed(seed);

        // When
        let keys = generate_subscription_keys_with_rng(&mut rng).expect("keys should generate");

        // Then
        assert_eq!(keys.private_key, "9pKJeIXAyyCj5M0QagsVvDYHlPF-cymJCbB5iHPsdEE");
        assert_eq!(keys.p256dh, TEST_KEY);
        assert_eq!(keys.auth.len(), 22);
    }

    #[test]
    fn application_server_key__should_accept_padded_standard_base64() {
        // Given
        let padded = format!("{}=", TEST_KEY.replace('-', "+").replace('_', "/"));

        // When
        let key = ApplicationServerKey::parse(&padded).expect("parse key");

        // Then
        assert_eq!(key.as_bytes().len(), 65);
        assert_eq!(key.to_base64(), TEST_KEY);
    }

    #[test]
    fn application_server_key__should_reject_short_keys() {
        // When
        let result = ApplicationServerKey::parse("BAAA");

        // Then
        assert_eq!(result, Err(KeyError::Shape(3)));
    }

    #[test]
    fn application_server_key__should_reject_garbage() {
        assert!(matches!(
            ApplicationServerKey::parse("not base64 at all!"),
            Err(KeyError::Encoding(_))
        ));
    }

    #[test]
    fn from_html__should_read_meta_tag() {
        // Given
        let html = format!(
            r#"<html><head><meta charset="utf-8"><meta name="vapid-public-key" content=" {TEST_KEY} "></head><body></body></html>"#
        );

        // When
        let key = ApplicationServerKey::from_html(&html)
            .expect("meta tag present")
            .expect("valid key");

        // Then
        assert_eq!(key, test_key());
    }

    #[test]
    fn from_html__should_return_none_without_meta_tag() {
        assert!(ApplicationServerKey::from_html("<html><head></head></html>").is_none());
    }
}
