//! Charter submission rules: media minimums, order and cover normalization,
//! and the finalize wire types.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::draft::DraftData;
use super::media::MediaRef;

/// Minimum number of photos a charter needs before it can be submitted.
pub const MIN_CHARTER_IMAGES: usize = 3;

/// Media block of `POST /drafts/{id}/finalize`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinalizeMedia {
    pub images: Vec<MediaRef>,
    pub videos: Vec<MediaRef>,
    pub images_order: Vec<usize>,
    pub videos_order: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images_cover_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<MediaRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub media: FinalizeMedia,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub ok: bool,
    pub charter_id: String,
    pub captain_profile_id: String,
}

/// Error body returned by finalize and charter media endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinalizeErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Body of `PUT /charters/{id}/media`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharterMediaUpdate {
    pub media: CharterMediaLists,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CharterMediaLists {
    pub images: Vec<MediaRef>,
    pub videos: Vec<MediaRef>,
}

/// Field-keyed validation issues.
pub type Issues = BTreeMap<String, Vec<String>>;

/// Validate a charter creation payload.
///
/// Issue keys: `images`, `amenities`, `trips`, `charter.name`.
pub fn validate_submission(data: &DraftData, media: &FinalizeMedia) -> Result<(), Issues> {
    let mut issues = Issues::new();

    if media.images.len() < MIN_CHARTER_IMAGES {
        issues.entry("images".into()).or_default().push(format!(
            "At least {MIN_CHARTER_IMAGES} photos are required (got {})",
            media.images.len()
        ));
    }
    if data.amenities.iter().all(|a| a.trim().is_empty()) {
        issues
            .entry("amenities".into())
            .or_default()
            .push("Select at least one amenity".into());
    }
    if data.trips.is_empty() {
        issues
            .entry("trips".into())
            .or_default()
            .push("Add at least one trip".into());
    }
    if data.charter.name.trim().is_empty() {
        issues
            .entry("charter.name".into())
            .or_default()
            .push("Charter name is required".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Reorder `items` by `order` when it is a full permutation of the indices.
///
/// Anything else (wrong length, duplicates, out-of-range entries) keeps the
/// original order.
pub fn apply_order<T: Clone>(items: &[T], order: &[usize]) -> Vec<T> {
    if order.len() != items.len() {
        return items.to_vec();
    }
    let mut seen = HashSet::with_capacity(order.len());
    for &idx in order {
        if idx >= items.len() || !seen.insert(idx) {
            return items.to_vec();
        }
    }
    order.iter().map(|&idx| items[idx].clone()).collect()
}

/// Move the cover image to the front. The cover index refers to the
/// already-ordered list; out-of-range indices are ignored.
pub fn apply_cover<T>(mut items: Vec<T>, cover: Option<usize>) -> Vec<T> {
    if let Some(idx) = cover {
        if idx < items.len() && idx != 0 {
            let cover_item = items.remove(idx);
            items.insert(0, cover_item);
        }
    }
    items
}

/// Final image sequence for a new charter. A cover index outside the list
/// discards the requested order too and keeps the uploaded sequence.
pub fn normalize_images<T: Clone>(items: &[T], order: &[usize], cover: Option<usize>) -> Vec<T> {
    if matches!(cover, Some(idx) if idx >= items.len()) {
        return items.to_vec();
    }
    apply_cover(apply_order(items, order), cover)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::draft::TripDraft;

    fn images(n: usize) -> Vec<MediaRef> {
        (0..n)
            .map(|i| MediaRef::new(format!("captains/u/media/{i}.jpg"), format!("/media/{i}.jpg")))
            .collect()
    }

    fn complete_data() -> DraftData {
        let mut data = DraftData::default();
        data.charter.name = "Reel Deal".into();
        data.amenities = vec!["Live bait".into()];
        data.trips = vec![TripDraft {
            name: "Half day".into(),
            ..TripDraft::default()
        }];
        data
    }

    #[test]
    fn fewer_than_three_images_fails_on_images_key() {
        let media = FinalizeMedia {
            images: images(2),
            ..FinalizeMedia::default()
        };
        let issues = validate_submission(&complete_data(), &media).unwrap_err();
        assert!(issues.contains_key("images"));
        assert!(!issues.contains_key("trips"));
    }

    #[test]
    fn three_images_one_amenity_one_trip_passes() {
        let media = FinalizeMedia {
            images: images(3),
            ..FinalizeMedia::default()
        };
        assert!(validate_submission(&complete_data(), &media).is_ok());
    }

    #[test]
    fn missing_amenities_and_trips_are_reported_together() {
        let mut data = complete_data();
        data.amenities.clear();
        data.trips.clear();
        let media = FinalizeMedia {
            images: images(4),
            ..FinalizeMedia::default()
        };
        let issues = validate_submission(&data, &media).unwrap_err();
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn duplicate_order_indices_fall_back_to_original() {
        let items = vec!["a", "b", "c"];
        assert_eq!(apply_order(&items, &[0, 0, 2]), items);
        assert_eq!(apply_order(&items, &[0, 1]), items);
        assert_eq!(apply_order(&items, &[2, 0, 9]), items);
        assert_eq!(apply_order(&items, &[2, 0, 1]), vec!["c", "a", "b"]);
    }

    #[test]
    fn out_of_range_cover_is_ignored() {
        let items = vec!["a", "b", "c"];
        assert_eq!(apply_cover(items.clone(), Some(7)), items);
        assert_eq!(apply_cover(items.clone(), Some(2)), vec!["c", "a", "b"]);
        assert_eq!(apply_cover(items.clone(), None), items);
    }

    #[test]
    fn out_of_range_cover_keeps_the_uploaded_sequence() {
        let items = vec!["a", "b", "c"];
        assert_eq!(normalize_images(&items, &[2, 0, 1], Some(3)), items);
        assert_eq!(normalize_images(&items, &[2, 0, 1], Some(2)), vec!["b", "c", "a"]);
        assert_eq!(normalize_images(&items, &[2, 0, 1], None), vec!["c", "a", "b"]);
        assert_eq!(normalize_images(&items, &[1, 1, 0], Some(1)), vec!["b", "a", "c"]);
    }
}
