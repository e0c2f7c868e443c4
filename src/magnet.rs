//! Magnet URI decomposition.
//!
//! Only BitTorrent v1 info hashes (`urn:btih:`) are accepted; the hash is
//! normalized to 40 lowercase hex characters whether it arrived as hex or
//! as 32-character base32. The normalized hash is the de-duplication key
//! across sources.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32;
use indexmap::IndexMap;
use thiserror::Error;

const SCHEME: &str = "magnet:?";
const BTIH_PREFIX: &str = "urn:btih:";

/// Why a magnet URI was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MagnetError {
    #[error("invalid magnet URI: {reason}")]
    InvalidMagnet {
        /// What was wrong with it
        reason: String,
    },
}

impl MagnetError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidMagnet {
            reason: reason.into(),
        }
    }
}

/// A parsed magnet URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Magnet {
    uri: String,
    info_hash: String,
    display_name: Option<String>,
    exact_length: Option<u64>,
    trackers: Vec<String>,
    web_seeds: Vec<String>,
    exact_source: Option<String>,
    acceptable_source: Option<String>,
    keyword_topic: Option<String>,
    extensions: IndexMap<String, Vec<String>>,
}

impl Magnet {
    /// Parses a magnet URI.
    ///
    /// # Errors
    ///
    /// [`MagnetError::InvalidMagnet`] when the scheme is wrong, `xt` is
    /// missing, repeated or not a v1 info hash, a single-valued parameter
    /// repeats, or `xl` is not an unsigned integer.
    pub fn parse(uri: &str) -> Result<Self, MagnetError> {
        let uri = uri.trim();
        let query = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| MagnetError::invalid("scheme is not 'magnet:?'"))?;

        let mut builder = Builder::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
            builder.push(key, raw)?;
        }
        builder.finish(uri)
    }

    /// The URI as given, without surrounding whitespace.
    #[must_use]
    pub fn as_uri(&self) -> &str {
        &self.uri
    }

    /// 40 lowercase hex characters.
    #[must_use]
    pub fn info_hash(&self) -> &str {
        &self.info_hash
    }

    /// True for the all-zero hash some indexes emit as a placeholder.
    #[must_use]
    pub fn is_null_hash(&self) -> bool {
        self.info_hash.bytes().all(|b| b == b'0')
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn exact_length(&self) -> Option<u64> {
        self.exact_length
    }

    #[must_use]
    pub fn trackers(&self) -> &[String] {
        &self.trackers
    }

    #[must_use]
    pub fn web_seeds(&self) -> &[String] {
        &self.web_seeds
    }

    #[must_use]
    pub fn exact_source(&self) -> Option<&str> {
        self.exact_source.as_deref()
    }

    #[must_use]
    pub fn acceptable_source(&self) -> Option<&str> {
        self.acceptable_source.as_deref()
    }

    #[must_use]
    pub fn keyword_topic(&self) -> Option<&str> {
        self.keyword_topic.as_deref()
    }

    /// `x.<name>` parameters keyed by `<name>`.
    #[must_use]
    pub fn extensions(&self) -> &IndexMap<String, Vec<String>> {
        &self.extensions
    }
}

impl FromStr for Magnet {
    type Err = MagnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Magnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

#[derive(Default)]
struct Builder {
    exact_topic: Option<String>,
    display_name: Option<String>,
    exact_length: Option<String>,
    exact_source: Option<String>,
    acceptable_source: Option<String>,
    keyword_topic: Option<String>,
    trackers: Vec<String>,
    web_seeds: Vec<String>,
    extensions: IndexMap<String, Vec<String>>,
}

impl Builder {
    fn push(&mut self, key: &str, raw: &str) -> Result<(), MagnetError> {
        if let Some(name) = key.strip_prefix("x.") {
            self.extensions
                .entry(name.to_string())
                .or_default()
                .push(decode(raw, false));
            return Ok(());
        }
        match base_key(key) {
            "xt" => set_once(&mut self.exact_topic, "xt", decode(raw, false)),
            "dn" => set_once(&mut self.display_name, "dn", decode(raw, true)),
            "xl" => set_once(&mut self.exact_length, "xl", decode(raw, false)),
            "xs" => set_once(&mut self.exact_source, "xs", decode(raw, false)),
            "as" => set_once(&mut self.acceptable_source, "as", decode(raw, false)),
            "kt" => set_once(&mut self.keyword_topic, "kt", decode(raw, false)),
            "tr" => {
                self.trackers.push(decode(raw, false));
                Ok(())
            }
            "ws" => {
                self.web_seeds.push(decode(raw, false));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn finish(self, uri: &str) -> Result<Magnet, MagnetError> {
        let topic = self
            .exact_topic
            .ok_or_else(|| MagnetError::invalid("missing 'xt' parameter"))?;
        let exact_length = self
            .exact_length
            .map(|xl| {
                xl.parse::<u64>()
                    .map_err(|_| MagnetError::invalid(format!("'xl' is not an unsigned integer: {xl}")))
            })
            .transpose()?;

        Ok(Magnet {
            uri: uri.to_string(),
            info_hash: info_hash(&topic)?,
            display_name: self.display_name,
            exact_length,
            trackers: self.trackers,
            web_seeds: self.web_seeds,
            exact_source: self.exact_source,
            acceptable_source: self.acceptable_source,
            keyword_topic: self.keyword_topic,
            extensions: self.extensions,
        })
    }
}

/// `tr.1` and `xt.2` count as `tr` and `xt`.
fn base_key(key: &str) -> &str {
    match key.split_once('.') {
        Some((base, index)) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => base,
        _ => key,
    }
}

fn set_once(slot: &mut Option<String>, key: &str, value: String) -> Result<(), MagnetError> {
    if slot.is_some() {
        return Err(MagnetError::invalid(format!("'{key}' appears more than once")));
    }
    *slot = Some(value);
    Ok(())
}

/// Percent-decodes a value; bytes that are not UTF-8 become U+FFFD.
fn decode(raw: &str, plus_is_space: bool) -> String {
    let raw = if plus_is_space {
        raw.replace('+', " ")
    } else {
        raw.to_string()
    };
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

fn info_hash(topic: &str) -> Result<String, MagnetError> {
    let hash = topic
        .get(..BTIH_PREFIX.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(BTIH_PREFIX))
        .map(|_| &topic[BTIH_PREFIX.len()..])
        .ok_or_else(|| MagnetError::invalid(format!("unsupported exact topic: {topic}")))?;

    match hash.len() {
        40 if hash.bytes().all(|b| b.is_ascii_hexdigit()) => Ok(hash.to_ascii_lowercase()),
        32 => BASE32
            .decode(hash.to_ascii_uppercase().as_bytes())
            .map(hex::encode)
            .map_err(|e| MagnetError::invalid(format!("bad base32 info hash: {e}"))),
        _ => Err(MagnetError::invalid(format!("info hash is neither hex nor base32: {hash}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const HEX: &str = "C12FE1C06BBA254A9DC9F519B335AA7C1367A88A";

    #[test]
    fn test_hex_hash_is_lowercased() {
        let uri = format!("magnet:?xt=urn:btih:{HEX}&dn=Big+Buck%20Bunny");
        let magnet = Magnet::parse(&uri).unwrap();
        assert_eq!(magnet.info_hash(), HEX.to_ascii_lowercase());
        assert_eq!(magnet.display_name(), Some("Big Buck Bunny"));
        assert_eq!(magnet.as_uri(), uri);
    }

    #[test]
    fn test_base32_hash_is_hex_encoded() {
        let raw = [0xABu8; 20];
        let base32 = BASE32.encode(&raw);
        assert_eq!(base32.len(), 32);
        let magnet: Magnet = format!("magnet:?xt=urn:btih:{base32}").parse().unwrap();
        assert_eq!(magnet.info_hash(), "ab".repeat(20));
    }

    #[test]
    fn test_lists_keep_order_and_duplicates() {
        let uri = format!(
            "magnet:?xt=urn:btih:{HEX}&tr=udp%3A%2F%2Fa%3A80&tr.1=udp://b&tr=udp%3A%2F%2Fa%3A80&ws=http://w&x.pe=1.2.3.4:5&x.pe=5.6.7.8:9&foo=bar"
        );
        let magnet = Magnet::parse(&uri).unwrap();
        assert_eq!(magnet.trackers(), ["udp://a:80", "udp://b", "udp://a:80"]);
        assert_eq!(magnet.web_seeds(), ["http://w"]);
        assert_eq!(magnet.extensions()["pe"], vec!["1.2.3.4:5", "5.6.7.8:9"]);
    }

    #[test]
    fn test_non_utf8_escapes_are_decoded_lossily() {
        let magnet = Magnet::parse(&format!(
            "magnet:?xt=urn:btih:{HEX}&dn=Am%E9lie.2001.720p&tr=udp%3A%2F%2Ft%E9st%3A80"
        ))
        .unwrap();
        assert_eq!(magnet.info_hash(), HEX.to_ascii_lowercase());
        assert_eq!(magnet.display_name(), Some("Am\u{FFFD}lie.2001.720p"));
        assert_eq!(magnet.trackers(), ["udp://t\u{FFFD}st:80"]);
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let uri = format!("magnet:?xt=urn:btih:{HEX}&dn=x");
        let magnet = Magnet::parse(&format!("\n  {uri} ")).unwrap();
        assert_eq!(magnet.info_hash(), HEX.to_ascii_lowercase());
        assert_eq!(magnet.as_uri(), uri);
    }

    #[test]
    fn test_exact_length_parsed() {
        let magnet = Magnet::parse(&format!("magnet:?xt=urn:btih:{HEX}&xl=1024")).unwrap();
        assert_eq!(magnet.exact_length(), Some(1024));
        assert!(Magnet::parse(&format!("magnet:?xt=urn:btih:{HEX}&xl=-1")).is_err());
    }

    #[test]
    fn test_rejections() {
        let cases = [
            "http://example.com".to_string(),
            "magnet:?dn=nohash".to_string(),
            format!("magnet:?xt=urn:btih:{HEX}&xt=urn:btih:{HEX}"),
            format!("magnet:?xt.1=urn:btih:{HEX}&xt.2=urn:btih:{HEX}"),
            format!("magnet:?xt=urn:btmh:1220{}", "a".repeat(64)),
            "magnet:?xt=urn:btih:abc".to_string(),
            format!("magnet:?xt=urn:btih:{HEX}&dn=a&dn=b"),
            format!("magnet:?xt=urn:btih:{HEX}&kt=a&kt=b"),
        ];
        for uri in cases {
            assert!(
                matches!(Magnet::parse(&uri), Err(MagnetError::InvalidMagnet { .. })),
                "should reject {uri}"
            );
        }
    }

    #[test]
    fn test_null_hash_detected() {
        let magnet = Magnet::parse(&format!("magnet:?xt=urn:btih:{}", "0".repeat(40))).unwrap();
        assert!(magnet.is_null_hash());
        assert!(!Magnet::parse(&format!("magnet:?xt=urn:btih:{HEX}")).unwrap().is_null_hash());
    }
}
