//! Upstream media records and the policies applied to them.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Source tiers in serving priority order.
pub const SOURCE_PRIORITY: [&str; 4] = ["original", "large2x", "large", "landscape"];

/// Host serving images addressed by media id.
pub const IMAGE_HOST: &str = "https://images.pexels.com";

/// Media identifier. The upstream uses integers; strings are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaId {
    Number(u64),
    Text(String),
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One entry of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaId,
    /// Discriminator, `Photo` or `Video`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Quality tier label to absolute URL.
    #[serde(default)]
    pub src: BTreeMap<String, String>,
    /// Remaining upstream fields, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MediaItem {
    /// A photo with at least one source URL.
    pub fn is_servable_photo(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|kind| kind.eq_ignore_ascii_case("photo"))
            && !self.src.is_empty()
    }

    /// First usable source URL: `preferred` if given and present, then the
    /// fixed priority order.
    pub fn image_url(&self, preferred: Option<&str>) -> Option<&str> {
        preferred
            .into_iter()
            .chain(SOURCE_PRIORITY)
            .find_map(|tier| self.src.get(tier).filter(|url| !url.is_empty()))
            .map(String::as_str)
    }

    /// Image URL built from the id alone: 1200px wide, compressed, uncropped.
    /// `None` for a zero or blank id.
    pub fn id_image_url(&self) -> Option<String> {
        let id = match &self.id {
            MediaId::Number(0) => return None,
            MediaId::Number(n) => n.to_string(),
            MediaId::Text(s) if s.trim().is_empty() => return None,
            MediaId::Text(s) => s.trim().to_string(),
        };
        Some(format!(
            "{}/photos/{id}/pexels-photo-{id}.jpeg?auto=compress&cs=tinysrgb&w=1200",
            IMAGE_HOST,
            id = id
        ))
    }
}

/// What to do with an item that has no usable source tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceFallback {
    /// The item cannot be served.
    #[default]
    None,
    /// Derive the URL from the item id.
    MediaId,
}

impl SourceFallback {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "id" | "media-id" | "media_id" => Some(Self::MediaId),
            _ => None,
        }
    }
}

/// How the image URL of a selected item is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePreference {
    /// Tier tried before [`SOURCE_PRIORITY`].
    pub preferred: Option<String>,
    pub fallback: SourceFallback,
}

impl SourcePreference {
    pub fn with_preferred(mut self, tier: impl Into<String>) -> Self {
        self.preferred = Some(tier.into());
        self
    }

    pub fn with_fallback(mut self, fallback: SourceFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// The URL to serve for `item`, if any.
    pub fn resolve<'a>(&self, item: &'a MediaItem) -> Option<Cow<'a, str>> {
        if let Some(url) = item.image_url(self.preferred.as_deref()) {
            return Some(Cow::Borrowed(url));
        }
        match self.fallback {
            SourceFallback::None => None,
            SourceFallback::MediaId => item.id_image_url().map(Cow::Owned),
        }
    }
}

/// A non-empty, ordered list of media items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MediaList(Vec<MediaItem>);

impl MediaList {
    /// Wrap `items`, or `None` if there are none.
    pub fn new(items: Vec<MediaItem>) -> Option<Self> {
        if items.is_empty() {
            None
        } else {
            Some(Self(items))
        }
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a constructed list.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which items may be served.
///
/// Collections can mix photos and videos. Whether non-photos are an
/// acceptable fallback is a deployment choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PoolPolicy {
    /// Photos only, unless there are none, then everything.
    #[default]
    PhotosPreferred,
    /// Photos only. A collection without photos serves nothing.
    PhotosOnly,
    /// Every item.
    Any,
}

impl PoolPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "photos-preferred" | "photos_preferred" => Some(Self::PhotosPreferred),
            "photos-only" | "photos_only" | "photos" => Some(Self::PhotosOnly),
            "any" | "all" => Some(Self::Any),
            _ => None,
        }
    }

    /// The servable pool for `media`. May be empty only for `PhotosOnly`.
    pub fn pool<'a>(&self, media: &'a MediaList) -> Vec<&'a MediaItem> {
        let all = || media.items().iter().collect::<Vec<_>>();
        let photos = || {
            media
                .items()
                .iter()
                .filter(|item| item.is_servable_photo())
                .collect::<Vec<_>>()
        };

        match self {
            Self::Any => all(),
            Self::PhotosOnly => photos(),
            Self::PhotosPreferred => {
                let photos = photos();
                if photos.is_empty() {
                    all()
                } else {
                    photos
                }
            }
        }
    }
}

/// Pick one item uniformly at random.
pub fn select<'a, R: Rng + ?Sized>(pool: &[&'a MediaItem], rng: &mut R) -> Option<&'a MediaItem> {
    pool.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn item(id: u64, kind: &str, tiers: &[&str]) -> MediaItem {
        MediaItem {
            id: MediaId::Number(id),
            kind: Some(kind.to_string()),
            src: tiers
                .iter()
                .map(|t| (t.to_string(), format!("https://images.example.com/{}/{}.jpeg", id, t)))
                .collect(),
            extra: Default::default(),
        }
    }

    // === Parsing ===

    #[test]
    fn test_parse_upstream_item() {
        let json = r#"{
            "id": 2014422,
            "type": "Photo",
            "width": 3024,
            "photographer": "Joey Farina",
            "src": {
                "original": "https://images.pexels.com/photos/2014422/a.jpeg",
                "large": "https://images.pexels.com/photos/2014422/a.jpeg?h=650"
            }
        }"#;

        let item: MediaItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, MediaId::Number(2014422));
        assert_eq!(item.kind.as_deref(), Some("Photo"));
        assert_eq!(item.src.len(), 2);
        assert_eq!(item.extra["photographer"], "Joey Farina");
        assert!(item.is_servable_photo());

        // Passthrough fields survive a round through the cache.
        let again: MediaItem = serde_json::from_str(&serde_json::to_string(&item).unwrap()).unwrap();
        assert_eq!(again, item);
    }

    #[test]
    fn test_video_without_src() {
        let item: MediaItem = serde_json::from_str(r#"{"id": "v1", "type": "Video"}"#).unwrap();
        assert_eq!(item.id.to_string(), "v1");
        assert!(item.src.is_empty());
        assert!(!item.is_servable_photo());
    }

    // === URL resolution ===

    #[test]
    fn test_image_url_priority() {
        let cases: [(&[&str], &str); 5] = [
            (&["landscape", "large", "large2x", "original"], "original"),
            (&["landscape", "large", "large2x"], "large2x"),
            (&["landscape", "large"], "large"),
            (&["landscape", "medium"], "landscape"),
            (&["tiny", "original"], "original"),
        ];

        for (tiers, expected) in cases {
            let item = item(1, "Photo", tiers);
            let url = item.image_url(None).unwrap();
            assert!(url.ends_with(&format!("/{}.jpeg", expected)), "{:?} -> {}", tiers, url);
        }
    }

    #[test]
    fn test_image_url_preferred_first() {
        let item = item(1, "Photo", &["original", "landscape"]);
        assert!(item.image_url(Some("landscape")).unwrap().ends_with("/landscape.jpeg"));
        // An absent preferred tier falls through to the fixed order.
        assert!(item.image_url(Some("portrait")).unwrap().ends_with("/original.jpeg"));
    }

    #[test]
    fn test_image_url_none() {
        assert_eq!(item(1, "Photo", &["tiny", "medium"]).image_url(None), None);

        let mut blank = item(2, "Photo", &[]);
        blank.src.insert("original".to_string(), String::new());
        assert_eq!(blank.image_url(None), None);
    }

    #[test]
    fn test_id_image_url() {
        let bare: MediaItem = serde_json::from_str(r#"{"id": 2014422, "type": "Photo"}"#).unwrap();
        assert_eq!(
            bare.id_image_url().as_deref(),
            Some("https://images.pexels.com/photos/2014422/pexels-photo-2014422.jpeg?auto=compress&cs=tinysrgb&w=1200")
        );

        let zero: MediaItem = serde_json::from_str(r#"{"id": 0}"#).unwrap();
        assert_eq!(zero.id_image_url(), None);
        let blank: MediaItem = serde_json::from_str(r#"{"id": " "}"#).unwrap();
        assert_eq!(blank.id_image_url(), None);
    }

    #[test]
    fn test_source_preference_fallback() {
        let bare: MediaItem = serde_json::from_str(r#"{"id": 2014422, "type": "Photo"}"#).unwrap();
        let strict = SourcePreference::default();
        assert_eq!(strict.resolve(&bare), None);

        let lenient = SourcePreference::default().with_fallback(SourceFallback::MediaId);
        let url = lenient.resolve(&bare).unwrap();
        assert!(url.starts_with("https://images.pexels.com/photos/2014422/"));

        // A real tier still wins over the derived URL.
        let full = item(5, "Photo", &["large", "landscape"]);
        let url = lenient.clone().with_preferred("landscape").resolve(&full).unwrap();
        assert!(url.ends_with("/landscape.jpeg"));
        assert!(lenient.resolve(&full).unwrap().ends_with("/large.jpeg"));
    }

    #[test]
    fn test_parse_source_fallback() {
        assert_eq!(SourceFallback::parse("ID"), Some(SourceFallback::MediaId));
        assert_eq!(SourceFallback::parse("none"), Some(SourceFallback::None));
        assert_eq!(SourceFallback::parse("guess"), None);
    }

    // === Pool policy ===

    #[test]
    fn test_pool_policies() {
        let mixed = MediaList::new(vec![
            item(1, "Photo", &["original"]),
            item(2, "Video", &[]),
            item(3, "Photo", &["large"]),
        ])
        .unwrap();

        let ids = |pool: Vec<&MediaItem>| pool.iter().map(|i| i.id.to_string()).collect::<Vec<_>>();
        assert_eq!(ids(PoolPolicy::PhotosPreferred.pool(&mixed)), vec!["1", "3"]);
        assert_eq!(ids(PoolPolicy::PhotosOnly.pool(&mixed)), vec!["1", "3"]);
        assert_eq!(ids(PoolPolicy::Any.pool(&mixed)), vec!["1", "2", "3"]);

        let videos = MediaList::new(vec![item(4, "Video", &[]), item(5, "Video", &[])]).unwrap();
        assert_eq!(PoolPolicy::PhotosPreferred.pool(&videos).len(), 2);
        assert!(PoolPolicy::PhotosOnly.pool(&videos).is_empty());
    }

    #[test]
    fn test_parse_pool_policy() {
        assert_eq!(PoolPolicy::parse("Photos-Only"), Some(PoolPolicy::PhotosOnly));
        assert_eq!(PoolPolicy::parse("any"), Some(PoolPolicy::Any));
        assert_eq!(PoolPolicy::parse("photos-preferred"), Some(PoolPolicy::PhotosPreferred));
        assert_eq!(PoolPolicy::parse("videos"), None);
    }

    #[test]
    fn test_media_list_rejects_empty() {
        assert!(MediaList::new(Vec::new()).is_none());
    }

    // === Selection ===

    #[test]
    fn test_select_empty_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select(&[], &mut rng).is_none());
    }

    #[test]
    fn test_selection_is_uniform() {
        const K: usize = 5;
        const TRIALS: usize = 20_000;

        let list = MediaList::new((0..K as u64).map(|i| item(i, "Photo", &["original"])).collect()).unwrap();
        let pool = PoolPolicy::Any.pool(&list);
        let mut rng = StdRng::seed_from_u64(0x5eed);

        let mut counts = [0usize; K];
        for _ in 0..TRIALS {
            let picked = select(&pool, &mut rng).unwrap();
            match picked.id {
                MediaId::Number(n) => counts[n as usize] += 1,
                MediaId::Text(_) => unreachable!(),
            }
        }

        // Expected 4000 per bucket, sd ~57; allow well over 5 sd.
        let expected = TRIALS / K;
        for count in counts {
            assert!(count.abs_diff(expected) < 400, "counts: {:?}", counts);
        }
    }
}
