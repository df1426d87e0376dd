use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form annotations for one calendar day.
///
/// There is at most one `DayMeta` per `date`. Records are created lazily the
/// first time a date is accessed and upserted by date afterwards.
///
/// In remote mode the `id` starts out as a locally generated placeholder and is
/// replaced by the store's permanent id after the first successful write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayMeta {
    pub id: Uuid,
    pub date: NaiveDate,
    /// Wake-up time as an `HH:MM` string.
    #[serde(default)]
    pub wake_time: Option<String>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub review: String,
}

impl DayMeta {
    pub fn blank(date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            wake_time: None,
            mood: None,
            goal: String::new(),
            review: String::new(),
        }
    }

    /// True when the user-editable fields of both records match.
    pub fn same_content(&self, other: &DayMeta) -> bool {
        self.date == other.date
            && self.wake_time == other.wake_time
            && self.mood == other.mood
            && self.goal == other.goal
            && self.review == other.review
    }
}

/// The fixed mood scale, stored as its emoji.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Mood {
    #[serde(rename = "😄")]
    Great,
    #[serde(rename = "🙂")]
    Good,
    #[serde(rename = "😐")]
    Okay,
    #[serde(rename = "😔")]
    Low,
    #[serde(rename = "😫")]
    Awful,
}

impl Mood {
    pub const ALL: [Mood; 5] = [Self::Great, Self::Good, Self::Okay, Self::Low, Self::Awful];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Great => "😄",
            Self::Good => "🙂",
            Self::Okay => "😐",
            Self::Low => "😔",
            Self::Awful => "😫",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Great => "great",
            Self::Good => "good",
            Self::Okay => "okay",
            Self::Low => "low",
            Self::Awful => "awful",
        }
    }

    /// Accepts either the emoji or the lowercase name.
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|mood| mood.as_str() == s || mood.name() == s)
    }
}

/// Partial update of a day's annotations. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayMetaPatch {
    pub wake_time: Option<String>,
    pub mood: Option<Mood>,
    pub goal: Option<String>,
    pub review: Option<String>,
}

impl DayMetaPatch {
    pub fn is_empty(&self) -> bool {
        self.wake_time.is_none() && self.mood.is_none() && self.goal.is_none() && self.review.is_none()
    }

    pub fn apply(&self, meta: &mut DayMeta) {
        if let Some(wake) = &self.wake_time {
            meta.wake_time = Some(wake.clone()).filter(|w| !w.is_empty());
        }
        if let Some(mood) = self.mood {
            meta.mood = Some(mood);
        }
        if let Some(goal) = &self.goal {
            meta.goal = goal.clone();
        }
        if let Some(review) = &self.review {
            meta.review = review.clone();
        }
    }
}
