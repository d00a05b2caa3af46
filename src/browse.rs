//! Public browse view.
//!
//! Turns the flat, already-sorted list of published lessons into the nested
//! section → subject → chapter hierarchy shown to students. The grouping has no
//! identity of its own: it is recomputed from the flat list on every fetch.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::{Lesson, LessonFilter, Link, Placement};

/// Chapter label for lessons that have none.
pub const DEFAULT_CHAPTER: &str = "Général";

/// BrowseQuery
///
/// Query parameters of `GET /browse`. Each narrows the published set by one
/// placement field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BrowseQuery {
    pub level: Option<String>,
    pub subject: Option<String>,
    pub grade: Option<String>,
}

impl BrowseQuery {
    /// The store filter for this query. Always restricted to published lessons.
    pub fn filter(&self) -> LessonFilter {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        LessonFilter {
            level: clean(&self.level),
            subject: clean(&self.subject),
            grade: clean(&self.grade),
            ..LessonFilter::published_only()
        }
    }
}

/// VideoRef
///
/// How the browse view should render a lesson video: an embedded player when the
/// URL belongs to a recognized host, an outbound link otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[ts(export)]
pub enum VideoRef {
    Embed { src: String },
    External { href: String },
}

impl VideoRef {
    pub fn resolve(video_url: &str) -> Self {
        match youtube_embed_url(video_url) {
            Some(src) => VideoRef::Embed { src },
            None => VideoRef::External {
                href: video_url.to_string(),
            },
        }
    }
}

/// Maps `youtube.com/watch?v=ID` and `youtu.be/ID` to `https://www.youtube.com/embed/ID`.
pub fn youtube_embed_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;

    let video_id = if host.contains("youtube.com") {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
    } else if host.contains("youtu.be") {
        url.path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_string)
    } else {
        None
    };

    video_id
        .filter(|id| !id.is_empty())
        .map(|id| format!("https://www.youtube.com/embed/{id}"))
}

/// BrowseLesson
///
/// A lesson as presented to students: no admin fields, video already resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BrowseLesson {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub lesson_type: Option<String>,
    pub pdf_url: Option<String>,
    pub video: Option<VideoRef>,
    pub links: Vec<Link>,
}

impl From<Lesson> for BrowseLesson {
    fn from(lesson: Lesson) -> Self {
        BrowseLesson {
            id: lesson.id,
            lesson_type: lesson.placement.lesson_type().map(str::to_string),
            video: lesson.video_url.as_deref().map(VideoRef::resolve),
            title: lesson.title,
            description: lesson.description,
            pdf_url: lesson.pdf_url,
            links: lesson.links,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChapterGroup {
    pub chapter: String,
    pub lessons: Vec<BrowseLesson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SubjectGroup {
    /// Unique across the whole tree (`<section>/<subject>`); used for toggle state.
    pub key: String,
    pub subject: String,
    pub chapters: Vec<ChapterGroup>,
}

/// BrowseSection
///
/// Top level of the hierarchy: `"<level> - <year>"` for curriculum lessons, the
/// grade for subject/grade lessons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BrowseSection {
    pub key: String,
    pub subjects: Vec<SubjectGroup>,
}

fn section_key(placement: &Placement) -> String {
    match placement {
        Placement::Curriculum(c) => format!("{} - {}", c.level, c.year),
        Placement::Grade(g) => g.grade.clone(),
    }
}

/// Index of the entry whose key matches, pushing a new one if absent.
fn slot<T>(items: &mut Vec<T>, matches: impl Fn(&T) -> bool, make: impl FnOnce() -> T) -> usize {
    match items.iter().position(matches) {
        Some(i) => i,
        None => {
            items.push(make());
            items.len() - 1
        }
    }
}

/// group_lessons
///
/// Groups a flat lesson list into sections, subjects and chapters. Groups appear in
/// the order their first lesson appears, and lessons keep their input order, so the
/// store's curriculum sort carries straight through to the view.
pub fn group_lessons(lessons: Vec<Lesson>) -> Vec<BrowseSection> {
    let mut sections: Vec<BrowseSection> = Vec::new();

    for lesson in lessons {
        let key = section_key(&lesson.placement);
        let subject = lesson.placement.subject().to_string();
        let chapter = lesson
            .placement
            .chapter()
            .unwrap_or(DEFAULT_CHAPTER)
            .to_string();

        let s = slot(
            &mut sections,
            |s| s.key == key,
            || BrowseSection {
                key: key.clone(),
                subjects: Vec::new(),
            },
        );
        let subjects = &mut sections[s].subjects;

        let subject_key = format!("{key}/{subject}");
        let j = slot(
            subjects,
            |g| g.subject == subject,
            || SubjectGroup {
                key: subject_key,
                subject: subject.clone(),
                chapters: Vec::new(),
            },
        );
        let chapters = &mut subjects[j].chapters;

        let c = slot(
            chapters,
            |g| g.chapter == chapter,
            || ChapterGroup {
                chapter: chapter.clone(),
                lessons: Vec::new(),
            },
        );
        chapters[c].lessons.push(lesson.into());
    }

    sections
}

/// ExpandState
///
/// Expanded/collapsed toggles of the browse view. Pure presentation state: it is
/// never persisted, and `retain_visible` drops toggles that no longer match the
/// tree recomputed after a fetch.
#[derive(Debug, Clone, Default)]
pub struct ExpandState {
    sections: HashSet<String>,
    subjects: HashSet<String>,
    lessons: HashSet<Uuid>,
}

fn toggle<T: Eq + std::hash::Hash>(set: &mut HashSet<T>, value: T) -> bool {
    if set.remove(&value) {
        false
    } else {
        set.insert(value);
        true
    }
}

impl ExpandState {
    /// Returns the new state: `true` when now expanded.
    pub fn toggle_section(&mut self, key: &str) -> bool {
        toggle(&mut self.sections, key.to_string())
    }

    pub fn toggle_subject(&mut self, key: &str) -> bool {
        toggle(&mut self.subjects, key.to_string())
    }

    pub fn toggle_lesson(&mut self, id: Uuid) -> bool {
        toggle(&mut self.lessons, id)
    }

    pub fn is_section_expanded(&self, key: &str) -> bool {
        self.sections.contains(key)
    }

    pub fn is_subject_expanded(&self, key: &str) -> bool {
        self.subjects.contains(key)
    }

    pub fn is_lesson_expanded(&self, id: Uuid) -> bool {
        self.lessons.contains(&id)
    }

    pub fn retain_visible(&mut self, tree: &[BrowseSection]) {
        let mut sections = HashSet::new();
        let mut subjects = HashSet::new();
        let mut lessons = HashSet::new();
        for section in tree {
            sections.insert(section.key.as_str());
            for subject in &section.subjects {
                subjects.insert(subject.key.as_str());
                for chapter in &subject.chapters {
                    lessons.extend(chapter.lessons.iter().map(|l| l.id));
                }
            }
        }
        self.sections.retain(|k| sections.contains(k.as_str()));
        self.subjects.retain(|k| subjects.contains(k.as_str()));
        self.lessons.retain(|id| lessons.contains(id));
    }
}
