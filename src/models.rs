use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ValidationError;

/// Lesson type assigned when the admin form leaves it blank.
pub const DEFAULT_LESSON_TYPE: &str = "Cours";

// --- Core Schemas ---

/// Lesson
///
/// One teachable unit, as returned by every read path of the API.
/// The placement fields are flattened into the lesson object on the wire, so a
/// curriculum lesson serializes as `{ "title": ..., "level": ..., "year": ..., ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Lesson {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub placement: Placement,
    pub pdf_url: Option<String>,
    pub video_url: Option<String>,
    pub published: bool,
    // Identity of the authenticated creator. Never editable after creation.
    pub created_by: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    // Insertion ordered.
    pub links: Vec<Link>,
}

/// Link
///
/// A titled URL owned by exactly one lesson. Has no lifecycle of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Link {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub title: String,
    pub url: String,
}

impl Link {
    /// The user-supplied content of the link, without generated ids.
    pub fn content(&self) -> LinkInput {
        LinkInput {
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }
}

/// Placement
///
/// Where a lesson sits in the curriculum. Two schemas coexist in stored data:
/// the simple subject/grade form and the hierarchical level/year/chapter form.
/// Both are normalized into this type once, at the store boundary.
///
/// Untagged: the curriculum form is tried first, so a payload carrying
/// `level` and `year` is always read as a curriculum placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(untagged)]
#[ts(export)]
pub enum Placement {
    Curriculum(CurriculumPlacement),
    Grade(GradePlacement),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CurriculumPlacement {
    pub level: String,
    pub year: String,
    pub subject: String,
    pub chapter: Option<String>,
    pub lesson_type: String,
    /// Display sort key inside a subject. Defaults to 0.
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GradePlacement {
    pub subject: String,
    pub grade: String,
}

impl Placement {
    pub fn subject(&self) -> &str {
        match self {
            Placement::Curriculum(c) => &c.subject,
            Placement::Grade(g) => &g.subject,
        }
    }

    pub fn level(&self) -> Option<&str> {
        match self {
            Placement::Curriculum(c) => Some(&c.level),
            Placement::Grade(_) => None,
        }
    }

    pub fn year(&self) -> Option<&str> {
        match self {
            Placement::Curriculum(c) => Some(&c.year),
            Placement::Grade(_) => None,
        }
    }

    pub fn chapter(&self) -> Option<&str> {
        match self {
            Placement::Curriculum(c) => c.chapter.as_deref(),
            Placement::Grade(_) => None,
        }
    }

    pub fn grade(&self) -> Option<&str> {
        match self {
            Placement::Curriculum(_) => None,
            Placement::Grade(g) => Some(&g.grade),
        }
    }

    pub fn lesson_type(&self) -> Option<&str> {
        match self {
            Placement::Curriculum(c) => Some(&c.lesson_type),
            Placement::Grade(_) => None,
        }
    }

    pub fn order(&self) -> i32 {
        match self {
            Placement::Curriculum(c) => c.order,
            Placement::Grade(_) => 0,
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// LinkInput
///
/// A link as submitted by the admin form, before it is assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LinkInput {
    pub title: String,
    pub url: String,
}

/// LessonPayload
///
/// Body of `POST /lessons` and `PUT /lessons/{id}`.
///
/// Every field is optional at the serde level so that a missing title or placement
/// field is reported as a `ValidationError` naming the field, instead of an opaque
/// deserialization failure. `validate` turns it into a `LessonInput`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct LessonPayload {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Omitted on update: the current flag is kept. Omitted on create: `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    /// Omitted on update: the current link set is kept. `[]` clears it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<LinkInput>>,
}

/// LessonInput
///
/// A validated, normalized lesson write. This is what the store consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonInput {
    pub title: String,
    pub description: Option<String>,
    pub placement: Placement,
    pub pdf_url: Option<String>,
    pub video_url: Option<String>,
    pub published: Option<bool>,
    pub links: Option<Vec<LinkInput>>,
}

/// Trims a form value and maps the empty string to `None`.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    non_blank(value).ok_or(ValidationError::MissingField(field))
}

fn checked_url(
    value: Option<String>,
    field: &'static str,
) -> Result<Option<String>, ValidationError> {
    match non_blank(value) {
        None => Ok(None),
        Some(raw) => match Url::parse(&raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(Some(raw)),
            _ => Err(ValidationError::InvalidUrl { field, value: raw }),
        },
    }
}

impl LessonPayload {
    /// Resolves the placement. A non-blank `level` or `year` selects the
    /// curriculum schema, otherwise the subject/grade schema applies.
    fn placement(&mut self) -> Result<Placement, ValidationError> {
        let subject = required(Some(std::mem::take(&mut self.subject)), "subject")?;
        let level = non_blank(self.level.take());
        let year = non_blank(self.year.take());

        if level.is_some() || year.is_some() {
            Ok(Placement::Curriculum(CurriculumPlacement {
                level: required(level, "level")?,
                year: required(year, "year")?,
                subject,
                chapter: non_blank(self.chapter.take()),
                lesson_type: non_blank(self.lesson_type.take())
                    .unwrap_or_else(|| DEFAULT_LESSON_TYPE.to_string()),
                order: self.order.unwrap_or(0),
            }))
        } else {
            Ok(Placement::Grade(GradePlacement {
                subject,
                grade: required(self.grade.take(), "grade")?,
            }))
        }
    }

    pub fn validate(mut self) -> Result<LessonInput, ValidationError> {
        let title = required(Some(std::mem::take(&mut self.title)), "title")?;
        let placement = self.placement()?;

        let links = match self.links.take() {
            None => None,
            Some(links) => Some(
                links
                    .into_iter()
                    .enumerate()
                    .map(|(index, link)| {
                        let title = non_blank(Some(link.title))
                            .ok_or(ValidationError::IncompleteLink { index, field: "title" })?;
                        let url = checked_url(Some(link.url), "links.url")?
                            .ok_or(ValidationError::IncompleteLink { index, field: "url" })?;
                        Ok(LinkInput { title, url })
                    })
                    .collect::<Result<Vec<_>, ValidationError>>()?,
            ),
        };

        Ok(LessonInput {
            title,
            description: non_blank(self.description),
            placement,
            pdf_url: checked_url(self.pdf_url, "pdfUrl")?,
            video_url: checked_url(self.video_url, "videoUrl")?,
            published: self.published,
            links,
        })
    }
}

impl From<&Lesson> for LessonPayload {
    /// Pre-fills a payload from an existing lesson (the admin "edit" flow).
    fn from(lesson: &Lesson) -> Self {
        let mut payload = LessonPayload {
            title: lesson.title.clone(),
            description: lesson.description.clone(),
            subject: lesson.placement.subject().to_string(),
            pdf_url: lesson.pdf_url.clone(),
            video_url: lesson.video_url.clone(),
            published: Some(lesson.published),
            links: Some(lesson.links.iter().map(Link::content).collect()),
            ..Default::default()
        };
        match &lesson.placement {
            Placement::Curriculum(c) => {
                payload.level = Some(c.level.clone());
                payload.year = Some(c.year.clone());
                payload.chapter = c.chapter.clone();
                payload.lesson_type = Some(c.lesson_type.clone());
                payload.order = Some(c.order);
            }
            Placement::Grade(g) => payload.grade = Some(g.grade.clone()),
        }
        payload
    }
}

// --- Query Schemas ---

/// LessonSort
///
/// The two supported orderings of a lesson listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum LessonSort {
    /// `createdAt` descending.
    Newest,
    /// `year` asc (missing last), `subject` asc, `order` asc, then `createdAt` desc.
    Curriculum,
}

/// LessonFilter
///
/// Conjunction of equality predicates. `None` means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonFilter {
    pub level: Option<String>,
    pub year: Option<String>,
    pub subject: Option<String>,
    pub chapter: Option<String>,
    pub grade: Option<String>,
    pub published: Option<bool>,
}

fn field_matches(expected: &Option<String>, actual: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(want) => actual == Some(want.as_str()),
    }
}

impl LessonFilter {
    pub fn published_only() -> Self {
        Self {
            published: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, lesson: &Lesson) -> bool {
        let p = &lesson.placement;
        field_matches(&self.level, p.level())
            && field_matches(&self.year, p.year())
            && field_matches(&self.subject, Some(p.subject()))
            && field_matches(&self.chapter, p.chapter())
            && field_matches(&self.grade, p.grade())
            && self.published.is_none_or(|want| lesson.published == want)
    }
}

/// LessonQuery
///
/// Query parameters accepted by `GET /lessons`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LessonQuery {
    pub level: Option<String>,
    pub year: Option<String>,
    pub subject: Option<String>,
    pub chapter: Option<String>,
    pub grade: Option<String>,
    pub published: Option<bool>,
    /// `newest` or `curriculum`. Defaults to `newest` when filtering by grade.
    pub sort: Option<LessonSort>,
}

impl LessonQuery {
    pub fn into_parts(self) -> (LessonFilter, LessonSort) {
        let filter = LessonFilter {
            level: non_blank(self.level),
            year: non_blank(self.year),
            subject: non_blank(self.subject),
            chapter: non_blank(self.chapter),
            grade: non_blank(self.grade),
            published: self.published,
        };
        let sort = self.sort.unwrap_or(if filter.grade.is_some() {
            LessonSort::Newest
        } else {
            LessonSort::Curriculum
        });
        (filter, sort)
    }
}

// --- Response Schemas ---

/// DeleteResponse
///
/// Acknowledgment returned by `DELETE /lessons/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DeleteResponse {
    pub success: bool,
}

/// PresignedUrlRequest
///
/// Input payload for requesting a short-lived upload URL for lesson media.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "chapter-1.pdf")]
    pub filename: String,
    /// Must be `application/pdf` or a `video/*` type.
    #[schema(example = "application/pdf")]
    pub file_type: String,
}

/// PresignedUrlResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// Object key the media will be stored under.
    pub resource_key: String,
    /// Permanent URL of the object once uploaded. This is the value to save as
    /// `pdfUrl` or `videoUrl`.
    pub resource_url: String,
}
