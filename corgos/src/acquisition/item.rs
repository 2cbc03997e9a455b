use std::collections::BTreeMap;

use reddit_feed::Submission;

/// A listed feed entry that has not been validated yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateItem {
    pub source_url: String,
    pub score: i64,
    pub is_pinned: bool,
    pub is_self_text: bool,
    pub is_gallery: bool,
    /// Gallery entries keyed by entry id. Empty for single-image posts.
    pub gallery_entries: BTreeMap<String, GalleryEntry>,
}

/// One picture of a gallery post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GalleryEntry {
    /// MIME type declared by the feed.
    pub format: Option<String>,
    pub representative_url: Option<String>,
}

impl CandidateItem {
    /// A plain link post.
    pub fn link(source_url: impl Into<String>, score: i64) -> Self {
        Self {
            source_url: source_url.into(),
            score,
            ..Default::default()
        }
    }
}

impl From<Submission> for CandidateItem {
    fn from(submission: Submission) -> Self {
        let gallery_entries = submission
            .media_metadata
            .into_iter()
            .map(|(id, media)| {
                let entry = GalleryEntry {
                    format: media.mime,
                    representative_url: media.source.and_then(|s| s.url),
                };
                (id, entry)
            })
            .collect();

        Self {
            source_url: submission.url,
            score: submission.score,
            is_pinned: submission.stickied,
            is_self_text: submission.is_self,
            is_gallery: submission.is_gallery,
            gallery_entries,
        }
    }
}
