//! Onboarding steps and per-step field validation.

use super::form::CharterForm;
use crate::domain::charter::MIN_CHARTER_IMAGES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepId {
    Basics,
    Experience,
    Trips,
    Media,
    Review,
}

impl StepId {
    pub const ALL: [StepId; 5] = [
        StepId::Basics,
        StepId::Experience,
        StepId::Trips,
        StepId::Media,
        StepId::Review,
    ];

    pub fn index(&self) -> usize {
        match self {
            Self::Basics => 0,
            Self::Experience => 1,
            Self::Trips => 2,
            Self::Media => 3,
            Self::Review => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basics => "basics",
            Self::Experience => "experience",
            Self::Trips => "trips",
            Self::Media => "media",
            Self::Review => "review",
        }
    }

    /// Accepts `basics` or a URL fragment such as `#basics`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('#');
        Self::ALL.into_iter().find(|step| step.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Basics => "Captain & charter basics",
            Self::Experience => "Experience & boat",
            Self::Trips => "Trips",
            Self::Media => "Photos & videos",
            Self::Review => "Review",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted form path, e.g. `trips.0.price`.
    pub path: String,
    pub message: String,
}

impl FieldError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationContext {
    /// Editing an already published charter.
    pub edit_mode: bool,
    /// Images the charter already has on the server (edit mode only).
    pub existing_image_count: usize,
}

fn require_text(errors: &mut Vec<FieldError>, path: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(path, "Required"));
    }
}

fn require_some<T>(errors: &mut Vec<FieldError>, path: &str, value: &Option<T>) {
    if value.is_none() {
        errors.push(FieldError::new(path, "Required"));
    }
}

/// Validate only the fields that belong to `step`.
pub fn validate_step(step: StepId, form: &CharterForm, ctx: ValidationContext) -> Vec<FieldError> {
    let mut errors = Vec::new();
    match step {
        StepId::Basics => {
            require_text(&mut errors, "captain.displayName", &form.captain.display_name);
            require_text(&mut errors, "captain.phone", &form.captain.phone);
            require_text(&mut errors, "charter.name", &form.charter.name);
            require_text(&mut errors, "charter.charterType", &form.charter.charter_type);
            require_text(&mut errors, "charter.state", &form.charter.state);
            require_text(&mut errors, "charter.city", &form.charter.city);
            require_text(&mut errors, "charter.startingPoint", &form.charter.starting_point);
        }
        StepId::Experience => {
            require_some(&mut errors, "captain.experienceYears", &form.captain.experience_years);
            require_text(&mut errors, "boat.name", &form.boat.name);
            require_text(&mut errors, "boat.boatType", &form.boat.boat_type);
            require_some(&mut errors, "boat.lengthFt", &form.boat.length_ft);
            match form.boat.capacity {
                Some(0) => errors.push(FieldError::new("boat.capacity", "Must be at least 1")),
                Some(_) => {}
                None => errors.push(FieldError::new("boat.capacity", "Required")),
            }
            if form.amenities.is_empty() {
                errors.push(FieldError::new("amenities", "Pick at least one amenity"));
            }
        }
        StepId::Trips => {
            if form.trips.is_empty() {
                errors.push(FieldError::new("trips", "Add at least one trip"));
            }
            for (i, trip) in form.trips.iter().enumerate() {
                require_text(&mut errors, &format!("trips.{i}.name"), &trip.name);
                require_text(&mut errors, &format!("trips.{i}.tripType"), &trip.trip_type);
                match trip.duration_hours {
                    Some(h) if h > 0.0 => {}
                    _ => errors.push(FieldError::new(
                        format!("trips.{i}.durationHours"),
                        "Enter a duration",
                    )),
                }
                match trip.price {
                    Some(p) if p >= 0.0 => {}
                    _ => errors.push(FieldError::new(format!("trips.{i}.price"), "Enter a price")),
                }
                match trip.max_anglers {
                    Some(n) if n > 0 => {}
                    _ => errors.push(FieldError::new(
                        format!("trips.{i}.maxAnglers"),
                        "Enter the number of anglers",
                    )),
                }
                if trip.start_times.is_empty() {
                    errors.push(FieldError::new(
                        format!("trips.{i}.startTimes"),
                        "Add a start time",
                    ));
                }
            }
        }
        StepId::Media => {
            let existing_ok = ctx.edit_mode && ctx.existing_image_count >= MIN_CHARTER_IMAGES;
            if !existing_ok && form.photos.len() < MIN_CHARTER_IMAGES {
                errors.push(FieldError::new(
                    "photos",
                    format!("Add at least {MIN_CHARTER_IMAGES} photos"),
                ));
            }
        }
        StepId::Review => {}
    }
    errors
}

/// Human label for an error path; trip fields share one label per field.
pub fn field_label(path: &str) -> String {
    let normalized: String = path
        .split('.')
        .filter(|segment| segment.parse::<usize>().is_err())
        .collect::<Vec<_>>()
        .join(".");
    let label = match normalized.as_str() {
        "captain.displayName" => "Display name",
        "captain.phone" => "Phone",
        "captain.experienceYears" => "Years of experience",
        "charter.name" => "Charter name",
        "charter.charterType" => "Charter type",
        "charter.state" => "State",
        "charter.city" => "City",
        "charter.startingPoint" => "Starting point",
        "boat.name" => "Boat name",
        "boat.boatType" => "Boat type",
        "boat.lengthFt" => "Boat length",
        "boat.capacity" => "Capacity",
        "amenities" => "Amenities",
        "trips" => "Trips",
        "trips.name" => "Trip name",
        "trips.tripType" => "Trip type",
        "trips.durationHours" => "Trip duration",
        "trips.price" => "Trip price",
        "trips.maxAnglers" => "Max anglers",
        "trips.startTimes" => "Start times",
        "photos" => "Photos",
        other => return other.to_string(),
    };
    label.to_string()
}
