//! In-memory onboarding form, as the captain edits it.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::domain::draft::{BoatDetails, CaptainBasics, CharterBasics, DraftData, TripDraft};
use crate::domain::media::MediaRef;

/// Stable identifier of a local file for its whole lifetime in the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub String);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

/// What makes two selections "the same file".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub name: String,
    pub size: u64,
    pub last_modified: i64,
}

/// A file picked by the captain that has not reached blob storage yet.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub id: FileId,
    pub name: String,
    pub mime_type: String,
    /// Milliseconds since the epoch.
    pub last_modified: i64,
    pub bytes: Arc<Vec<u8>>,
}

impl LocalFile {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        last_modified: i64,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id: FileId::new(),
            name: name.into(),
            mime_type: mime_type.into(),
            last_modified,
            bytes: Arc::new(bytes),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn identity(&self) -> FileIdentity {
        FileIdentity {
            name: self.name.clone(),
            size: self.size(),
            last_modified: self.last_modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaSlot {
    Local(LocalFile),
    Uploaded(MediaRef),
}

impl MediaSlot {
    pub fn uploaded(&self) -> Option<&MediaRef> {
        match self {
            Self::Uploaded(m) => Some(m),
            Self::Local(_) => None,
        }
    }
}

/// The form as shared by the draft manager, wizard and finalize flow.
pub type SharedForm = Arc<Mutex<CharterForm>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharterForm {
    pub captain: CaptainBasics,
    pub charter: CharterBasics,
    pub amenities: Vec<String>,
    pub boat: BoatDetails,
    pub trips: Vec<TripDraft>,
    pub photos: Vec<MediaSlot>,
    pub videos: Vec<MediaSlot>,
    pub avatar: Option<MediaSlot>,
    pub images_order: Option<Vec<usize>>,
    pub images_cover_index: Option<usize>,
}

impl CharterForm {
    /// Draft-safe snapshot: local files are dropped, only uploaded references remain.
    pub fn to_draft_data(&self) -> DraftData {
        DraftData {
            captain: self.captain.clone(),
            charter: self.charter.clone(),
            amenities: self.amenities.clone(),
            boat: self.boat.clone(),
            trips: self.trips.clone(),
            uploaded_images: self.photos.iter().filter_map(|s| s.uploaded().cloned()).collect(),
            uploaded_videos: self.videos.iter().filter_map(|s| s.uploaded().cloned()).collect(),
            images_order: self.images_order.clone(),
            images_cover_index: self.images_cover_index,
            avatar: self.avatar.as_ref().and_then(|s| s.uploaded().cloned()),
        }
    }

    /// Rebuild a form from a stored draft.
    pub fn from_draft_data(data: DraftData) -> Self {
        Self {
            captain: data.captain,
            charter: data.charter,
            amenities: data.amenities,
            boat: data.boat,
            trips: data.trips,
            photos: data.uploaded_images.into_iter().map(MediaSlot::Uploaded).collect(),
            videos: data.uploaded_videos.into_iter().map(MediaSlot::Uploaded).collect(),
            avatar: data.avatar.map(MediaSlot::Uploaded),
            images_order: data.images_order,
            images_cover_index: data.images_cover_index,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn into_shared(self) -> SharedForm {
        Arc::new(Mutex::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_snapshot_strips_local_files() {
        let mut form = CharterForm::default();
        form.photos = vec![
            MediaSlot::Uploaded(MediaRef::new("captains/u/media/1-a.jpg", "http://x/a.jpg")),
            MediaSlot::Local(LocalFile::new("b.jpg", "image/jpeg", 1, vec![1, 2, 3])),
        ];
        form.avatar = Some(MediaSlot::Local(LocalFile::new("me.png", "image/png", 1, vec![9])));

        let data = form.to_draft_data();
        assert_eq!(data.uploaded_images.len(), 1);
        assert!(data.avatar.is_none());

        let json = serde_json::to_string(&data).unwrap();
        assert!(!json.contains("b.jpg"));
    }

    #[test]
    fn identity_ignores_the_generated_id() {
        let a = LocalFile::new("a.mp4", "video/mp4", 42, vec![0; 10]);
        let b = LocalFile::new("a.mp4", "video/mp4", 42, vec![1; 10]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.identity(), b.identity());
    }
}
