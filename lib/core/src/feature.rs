//! Feature catalogue and the normalised feature vector
//!
//! Every attribute the service understands is listed in [`Feature`]. A
//! [`FeatureVector`] holds one typed value per feature; missing attributes are
//! stored as the empty string (or `false` for flags) and are never treated as
//! a wildcard.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A recognised fingerprint attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    UserAgent,
    Platform,
    Cookie,
    Canvas,
    Webgl,
    PublicIp,
    IntranetIp,
    ColorDepth,
    ScreenResolution,
    Timezone,
    Language,
    Fonts,
    Plugins,
    LocalStorage,
    IndexedDb,
    OpenDatabase,
    DoNotTrack,
}

/// How values of a feature are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Short categorical string, exact match
    Categorical,
    /// Long free text, compared with a string-similarity ratio
    Fuzzy,
    /// Opaque render hash, exact match
    Hash,
    /// Capability flag
    Flag,
}

impl Feature {
    pub const ALL: [Feature; 17] = [
        Feature::UserAgent,
        Feature::Platform,
        Feature::Cookie,
        Feature::Canvas,
        Feature::Webgl,
        Feature::PublicIp,
        Feature::IntranetIp,
        Feature::ColorDepth,
        Feature::ScreenResolution,
        Feature::Timezone,
        Feature::Language,
        Feature::Fonts,
        Feature::Plugins,
        Feature::LocalStorage,
        Feature::IndexedDb,
        Feature::OpenDatabase,
        Feature::DoNotTrack,
    ];

    /// Canonical snake_case name, as stored and as accepted on the wire
    pub fn name(self) -> &'static str {
        match self {
            Feature::UserAgent => "user_agent",
            Feature::Platform => "platform",
            Feature::Cookie => "cookie",
            Feature::Canvas => "canvas",
            Feature::Webgl => "webgl",
            Feature::PublicIp => "public_ip",
            Feature::IntranetIp => "intranet_ip",
            Feature::ColorDepth => "color_depth",
            Feature::ScreenResolution => "screen_resolution",
            Feature::Timezone => "timezone",
            Feature::Language => "language",
            Feature::Fonts => "fonts",
            Feature::Plugins => "plugins",
            Feature::LocalStorage => "local_storage",
            Feature::IndexedDb => "indexed_db",
            Feature::OpenDatabase => "open_database",
            Feature::DoNotTrack => "do_not_track",
        }
    }

    /// Wire keys accepted for this feature, in order of precedence
    pub fn wire_keys(self) -> &'static [&'static str] {
        match self {
            Feature::UserAgent => &["user_agent", "userAgent"],
            Feature::Platform => &["platform"],
            Feature::Cookie => &["cookie"],
            Feature::Canvas => &["canvas"],
            Feature::Webgl => &["webgl"],
            Feature::PublicIp => &["public_ip"],
            Feature::IntranetIp => &["intranet_ip"],
            Feature::ColorDepth => &["color_depth"],
            Feature::ScreenResolution => &["screen_resolution"],
            Feature::Timezone => &["timezone"],
            Feature::Language => &["language"],
            Feature::Fonts => &["fonts"],
            Feature::Plugins => &["plugins"],
            Feature::LocalStorage => &["local_storage"],
            Feature::IndexedDb => &["indexed_db"],
            Feature::OpenDatabase => &["open_database"],
            Feature::DoNotTrack => &["do_not_track"],
        }
    }

    pub fn kind(self) -> FeatureKind {
        match self {
            Feature::UserAgent | Feature::Fonts | Feature::Plugins => FeatureKind::Fuzzy,
            Feature::Canvas | Feature::Webgl => FeatureKind::Hash,
            Feature::LocalStorage | Feature::IndexedDb | Feature::OpenDatabase => FeatureKind::Flag,
            _ => FeatureKind::Categorical,
        }
    }

    /// Look a feature up by any of its wire keys
    pub fn from_key(key: &str) -> Option<Feature> {
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.wire_keys().contains(&key))
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Borrowed view of one feature's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureValue<'a> {
    Text(&'a str),
    Flag(bool),
}

impl FeatureValue<'_> {
    /// A value takes part in comparison only when present.
    ///
    /// Empty text is absent. A lowered flag is absent too: only a raised flag
    /// is evidence about the client.
    pub fn is_present(&self) -> bool {
        match self {
            FeatureValue::Text(s) => !s.is_empty(),
            FeatureValue::Flag(b) => *b,
        }
    }
}

/// Normalised, typed form of a fingerprint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureVector {
    pub user_agent: String,
    pub platform: String,
    pub cookie: String,
    pub canvas: String,
    pub webgl: String,
    pub public_ip: String,
    /// `||`-separated list of local addresses
    pub intranet_ip: String,
    pub color_depth: String,
    pub screen_resolution: String,
    pub timezone: String,
    pub language: String,
    /// `, `-separated font list
    pub fonts: String,
    /// `, `-separated plugin list
    pub plugins: String,
    pub local_storage: bool,
    pub indexed_db: bool,
    pub open_database: bool,
    pub do_not_track: String,
}

/// Separator between entries of the intranet address list
pub const INTRANET_IP_SEPARATOR: &str = "||";

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> FeatureValue<'_> {
        match feature {
            Feature::UserAgent => FeatureValue::Text(&self.user_agent),
            Feature::Platform => FeatureValue::Text(&self.platform),
            Feature::Cookie => FeatureValue::Text(&self.cookie),
            Feature::Canvas => FeatureValue::Text(&self.canvas),
            Feature::Webgl => FeatureValue::Text(&self.webgl),
            Feature::PublicIp => FeatureValue::Text(&self.public_ip),
            Feature::IntranetIp => FeatureValue::Text(&self.intranet_ip),
            Feature::ColorDepth => FeatureValue::Text(&self.color_depth),
            Feature::ScreenResolution => FeatureValue::Text(&self.screen_resolution),
            Feature::Timezone => FeatureValue::Text(&self.timezone),
            Feature::Language => FeatureValue::Text(&self.language),
            Feature::Fonts => FeatureValue::Text(&self.fonts),
            Feature::Plugins => FeatureValue::Text(&self.plugins),
            Feature::LocalStorage => FeatureValue::Flag(self.local_storage),
            Feature::IndexedDb => FeatureValue::Flag(self.indexed_db),
            Feature::OpenDatabase => FeatureValue::Flag(self.open_database),
            Feature::DoNotTrack => FeatureValue::Text(&self.do_not_track),
        }
    }

    pub(crate) fn set_text(&mut self, feature: Feature, value: String) {
        let slot = match feature {
            Feature::UserAgent => &mut self.user_agent,
            Feature::Platform => &mut self.platform,
            Feature::Cookie => &mut self.cookie,
            Feature::Canvas => &mut self.canvas,
            Feature::Webgl => &mut self.webgl,
            Feature::PublicIp => &mut self.public_ip,
            Feature::IntranetIp => &mut self.intranet_ip,
            Feature::ColorDepth => &mut self.color_depth,
            Feature::ScreenResolution => &mut self.screen_resolution,
            Feature::Timezone => &mut self.timezone,
            Feature::Language => &mut self.language,
            Feature::Fonts => &mut self.fonts,
            Feature::Plugins => &mut self.plugins,
            Feature::DoNotTrack => &mut self.do_not_track,
            Feature::LocalStorage | Feature::IndexedDb | Feature::OpenDatabase => return,
        };
        *slot = value;
    }

    pub(crate) fn set_flag(&mut self, feature: Feature, value: bool) {
        match feature {
            Feature::LocalStorage => self.local_storage = value,
            Feature::IndexedDb => self.indexed_db = value,
            Feature::OpenDatabase => self.open_database = value,
            _ => {}
        }
    }

    /// Number of features carrying a value
    pub fn present_count(&self) -> usize {
        Feature::ALL
            .iter()
            .filter(|f| self.get(**f).is_present())
            .count()
    }

    /// Entries of the intranet address list, blanks removed
    pub fn intranet_ips(&self) -> impl Iterator<Item = &str> + Clone {
        self.intranet_ip
            .split(INTRANET_IP_SEPARATOR)
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Feature::UserAgent.kind(), FeatureKind::Fuzzy);
        assert_eq!(Feature::Fonts.kind(), FeatureKind::Fuzzy);
        assert_eq!(Feature::Canvas.kind(), FeatureKind::Hash);
        assert_eq!(Feature::IndexedDb.kind(), FeatureKind::Flag);
        assert_eq!(Feature::Timezone.kind(), FeatureKind::Categorical);
    }

    #[test]
    fn test_from_key_accepts_aliases() {
        assert_eq!(Feature::from_key("userAgent"), Some(Feature::UserAgent));
        assert_eq!(Feature::from_key("user_agent"), Some(Feature::UserAgent));
        assert_eq!(Feature::from_key("indexed_db"), Some(Feature::IndexedDb));
        assert_eq!(Feature::from_key("battery"), None);
    }

    #[test]
    fn test_names_match_serde() {
        for feature in Feature::ALL {
            let json = serde_json::to_string(&feature).unwrap();
            assert_eq!(json, format!("\"{}\"", feature.name()));
        }
    }

    #[test]
    fn test_presence() {
        let mut v = FeatureVector::default();
        assert_eq!(v.present_count(), 0);

        v.timezone = "Europe/Rome".to_string();
        v.local_storage = true;
        assert_eq!(v.present_count(), 2);
        assert!(!v.get(Feature::IndexedDb).is_present());
    }

    #[test]
    fn test_intranet_ips() {
        let v = FeatureVector {
            intranet_ip: "10.0.0.2|| 192.168.1.4 ||".to_string(),
            ..Default::default()
        };
        let ips: Vec<&str> = v.intranet_ips().collect();
        assert_eq!(ips, vec!["10.0.0.2", "192.168.1.4"]);
    }

    #[test]
    fn test_missing_fields_deserialize_as_empty() {
        let v: FeatureVector = serde_json::from_str(r#"{"platform": "Linux x86_64"}"#).unwrap();
        assert_eq!(v.platform, "Linux x86_64");
        assert!(v.user_agent.is_empty());
        assert!(!v.local_storage);
    }
}
