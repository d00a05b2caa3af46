use crate::{
    error::StoreError,
    models::{
        CurriculumPlacement, DEFAULT_LESSON_TYPE, GradePlacement, Lesson, LessonFilter,
        LessonInput, LessonSort, Link, LinkInput, Placement,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, query_builder::QueryBuilder};
use std::{cmp::Ordering, collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// LessonRepository
///
/// The abstract contract for lesson persistence. Handlers only ever see this trait,
/// so the Postgres store and the in-memory store are interchangeable.
///
/// Every write is atomic with respect to the lesson and its link set: no reader
/// observes a lesson whose links have been removed but not yet re-inserted.
#[async_trait]
pub trait LessonRepository: Send + Sync {
    /// All lessons matching `filter`, links attached, ordered by `sort`.
    async fn find_lessons(
        &self,
        filter: &LessonFilter,
        sort: LessonSort,
    ) -> Result<Vec<Lesson>, StoreError>;

    async fn find_lesson(&self, id: Uuid) -> Result<Lesson, StoreError>;

    /// Inserts the lesson and its links in one unit. `published` defaults to false.
    async fn create_lesson(&self, input: LessonInput, created_by: &str)
    -> Result<Lesson, StoreError>;

    /// Replaces all mutable fields. When `input.links` is `Some`, the whole link
    /// set is replaced (an empty list clears it); `None` leaves links untouched.
    async fn update_lesson(&self, id: Uuid, input: LessonInput) -> Result<Lesson, StoreError>;

    /// Removes the lesson and, by cascade, its links.
    async fn delete_lesson(&self, id: Uuid) -> Result<(), StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn LessonRepository>;

// --- Row Mapping (Store Boundary) ---

const LESSON_COLUMNS: &str = "id, title, description, subject, grade, level, year, chapter, \
     lesson_type, sort_order, pdf_url, video_url, published, created_by, created_at, updated_at";

/// LessonRow
///
/// Raw `lessons` row. Both placement schemas share the table, so every placement
/// column except `subject` is nullable. Normalized into `Lesson` by `into_lesson`.
#[derive(Debug, Clone, FromRow)]
struct LessonRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    subject: String,
    grade: Option<String>,
    level: Option<String>,
    year: Option<String>,
    chapter: Option<String>,
    lesson_type: Option<String>,
    sort_order: i32,
    pdf_url: Option<String>,
    video_url: Option<String>,
    published: bool,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct LinkRow {
    id: Uuid,
    lesson_id: Uuid,
    title: String,
    url: String,
}

impl From<LinkRow> for Link {
    fn from(row: LinkRow) -> Self {
        Link {
            id: row.id,
            lesson_id: row.lesson_id,
            title: row.title,
            url: row.url,
        }
    }
}

impl LessonRow {
    /// Rows carrying `level` and `year` are curriculum lessons; rows carrying only
    /// `grade` are legacy subject/grade lessons. Anything else is corrupt.
    fn into_lesson(self, links: Vec<Link>) -> Result<Lesson, StoreError> {
        let placement = match (self.level, self.year, self.grade) {
            (Some(level), Some(year), _) => Placement::Curriculum(CurriculumPlacement {
                level,
                year,
                subject: self.subject,
                chapter: self.chapter,
                lesson_type: self
                    .lesson_type
                    .unwrap_or_else(|| DEFAULT_LESSON_TYPE.to_string()),
                order: self.sort_order,
            }),
            (_, _, Some(grade)) => Placement::Grade(GradePlacement {
                subject: self.subject,
                grade,
            }),
            _ => {
                return Err(StoreError::Corrupt {
                    id: self.id,
                    reason: "row has neither level/year nor grade".to_string(),
                });
            }
        };

        Ok(Lesson {
            id: self.id,
            title: self.title,
            description: self.description,
            placement,
            pdf_url: self.pdf_url,
            video_url: self.video_url,
            published: self.published,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            links,
        })
    }
}

// --- Postgres ---

/// PostgresRepository
///
/// The production implementation of `LessonRepository`, backed by PostgreSQL.
/// Writes run inside a transaction; reads run in a `REPEATABLE READ` snapshot so
/// the lesson rows and their link rows come from the same point in time.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_eq(builder: &mut QueryBuilder<'_, Postgres>, column: &str, value: &Option<String>) {
    if let Some(v) = value {
        builder.push(format!(" AND {column} = "));
        builder.push_bind(v.clone());
    }
}

async fn fetch_links(
    conn: &mut PgConnection,
    lesson_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Link>>, StoreError> {
    let rows: Vec<LinkRow> = sqlx::query_as(
        "SELECT id, lesson_id, title, url FROM lesson_links \
         WHERE lesson_id = ANY($1) ORDER BY lesson_id, position",
    )
    .bind(lesson_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_lesson: HashMap<Uuid, Vec<Link>> = HashMap::new();
    for row in rows {
        by_lesson.entry(row.lesson_id).or_default().push(row.into());
    }
    Ok(by_lesson)
}

async fn insert_links(
    conn: &mut PgConnection,
    lesson_id: Uuid,
    links: &[LinkInput],
) -> Result<Vec<Link>, StoreError> {
    let mut inserted = Vec::with_capacity(links.len());
    for (position, link) in links.iter().enumerate() {
        let row: LinkRow = sqlx::query_as(
            "INSERT INTO lesson_links (id, lesson_id, position, title, url) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id, lesson_id, title, url",
        )
        .bind(Uuid::new_v4())
        .bind(lesson_id)
        .bind(position as i32)
        .bind(&link.title)
        .bind(&link.url)
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(row.into());
    }
    Ok(inserted)
}

async fn begin_snapshot(
    pool: &PgPool,
) -> Result<sqlx::Transaction<'static, Postgres>, StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

#[async_trait]
impl LessonRepository for PostgresRepository {
    /// find_lessons
    ///
    /// Builds the filter with `QueryBuilder` so every value is bound, never interpolated.
    async fn find_lessons(
        &self,
        filter: &LessonFilter,
        sort: LessonSort,
    ) -> Result<Vec<Lesson>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE TRUE"));

        push_eq(&mut builder, "level", &filter.level);
        push_eq(&mut builder, "year", &filter.year);
        push_eq(&mut builder, "subject", &filter.subject);
        push_eq(&mut builder, "chapter", &filter.chapter);
        push_eq(&mut builder, "grade", &filter.grade);
        if let Some(published) = filter.published {
            builder.push(" AND published = ");
            builder.push_bind(published);
        }

        builder.push(match sort {
            LessonSort::Newest => " ORDER BY created_at DESC",
            LessonSort::Curriculum => {
                " ORDER BY year COLLATE \"C\" ASC NULLS LAST, subject COLLATE \"C\" ASC, \
                 sort_order ASC, created_at DESC"
            }
        });

        let mut tx = begin_snapshot(&self.pool).await?;
        let rows: Vec<LessonRow> = builder.build_query_as().fetch_all(&mut *tx).await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut links = fetch_links(&mut tx, &ids).await?;
        tx.commit().await?;

        rows.into_iter()
            .map(|row| {
                let lesson_links = links.remove(&row.id).unwrap_or_default();
                row.into_lesson(lesson_links)
            })
            .collect()
    }

    async fn find_lesson(&self, id: Uuid) -> Result<Lesson, StoreError> {
        let sql = format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = $1");

        let mut tx = begin_snapshot(&self.pool).await?;
        let row: LessonRow = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        let mut links = fetch_links(&mut tx, &[id]).await?;
        tx.commit().await?;

        row.into_lesson(links.remove(&id).unwrap_or_default())
    }

    /// create_lesson
    ///
    /// The lesson row and every link row are written in a single transaction. A
    /// failure on any insert drops the transaction, rolling everything back.
    async fn create_lesson(
        &self,
        input: LessonInput,
        created_by: &str,
    ) -> Result<Lesson, StoreError> {
        let sql = format!(
            "INSERT INTO lessons (id, title, description, subject, grade, level, year, chapter, \
             lesson_type, sort_order, pdf_url, video_url, published, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW(), NOW()) \
             RETURNING {LESSON_COLUMNS}"
        );
        let p = &input.placement;

        let mut tx = self.pool.begin().await?;
        let row: LessonRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(&input.title)
            .bind(&input.description)
            .bind(p.subject())
            .bind(p.grade())
            .bind(p.level())
            .bind(p.year())
            .bind(p.chapter())
            .bind(p.lesson_type())
            .bind(p.order())
            .bind(&input.pdf_url)
            .bind(&input.video_url)
            .bind(input.published.unwrap_or(false))
            .bind(created_by)
            .fetch_one(&mut *tx)
            .await?;

        let links = match &input.links {
            Some(links) => insert_links(&mut tx, row.id, links).await?,
            None => Vec::new(),
        };
        tx.commit().await?;

        row.into_lesson(links)
    }

    /// update_lesson
    ///
    /// `published` is only overwritten when supplied (`COALESCE`). Links are deleted
    /// and re-inserted inside the same transaction as the row update.
    async fn update_lesson(&self, id: Uuid, input: LessonInput) -> Result<Lesson, StoreError> {
        let sql = format!(
            "UPDATE lessons SET title = $2, description = $3, subject = $4, grade = $5, \
             level = $6, year = $7, chapter = $8, lesson_type = $9, sort_order = $10, \
             pdf_url = $11, video_url = $12, published = COALESCE($13, published), \
             updated_at = NOW() \
             WHERE id = $1 RETURNING {LESSON_COLUMNS}"
        );
        let p = &input.placement;

        let mut tx = self.pool.begin().await?;
        let row: LessonRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(&input.title)
            .bind(&input.description)
            .bind(p.subject())
            .bind(p.grade())
            .bind(p.level())
            .bind(p.year())
            .bind(p.chapter())
            .bind(p.lesson_type())
            .bind(p.order())
            .bind(&input.pdf_url)
            .bind(&input.video_url)
            .bind(input.published)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        let links = match &input.links {
            Some(links) => {
                sqlx::query("DELETE FROM lesson_links WHERE lesson_id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                insert_links(&mut tx, id, links).await?
            }
            None => fetch_links(&mut tx, &[id])
                .await?
                .remove(&id)
                .unwrap_or_default(),
        };
        tx.commit().await?;

        row.into_lesson(links)
    }

    /// delete_lesson
    ///
    /// Link rows go with the lesson through `ON DELETE CASCADE`.
    async fn delete_lesson(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM lessons WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// --- In-Memory ---

/// Orders two lessons according to `sort`, matching the SQL `ORDER BY` clauses.
/// Strings compare bytewise, like the `"C"` collation used there.
pub fn compare_lessons(a: &Lesson, b: &Lesson, sort: LessonSort) -> Ordering {
    match sort {
        LessonSort::Newest => b.created_at.cmp(&a.created_at),
        LessonSort::Curriculum => {
            let year = match (a.placement.year(), b.placement.year()) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            year.then_with(|| a.placement.subject().cmp(b.placement.subject()))
                .then_with(|| a.placement.order().cmp(&b.placement.order()))
                .then_with(|| b.created_at.cmp(&a.created_at))
        }
    }
}

#[derive(Default)]
struct MemoryTables {
    // Lesson rows, stored with an empty `links` vector.
    lessons: Vec<Lesson>,
    // Link rows in insertion order across all lessons.
    links: Vec<Link>,
    last_tick: Option<DateTime<Utc>>,
}

impl MemoryTables {
    /// Strictly increasing timestamps, so creation order is always observable.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_tick {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_tick = Some(next);
        next
    }

    fn assemble(&self, row: &Lesson) -> Lesson {
        let mut lesson = row.clone();
        lesson.links = self
            .links
            .iter()
            .filter(|l| l.lesson_id == row.id)
            .cloned()
            .collect();
        lesson
    }

    fn insert_links(&mut self, lesson_id: Uuid, links: &[LinkInput]) {
        self.links.extend(links.iter().map(|l| Link {
            id: Uuid::new_v4(),
            lesson_id,
            title: l.title.clone(),
            url: l.url.clone(),
        }));
    }
}

/// InMemoryRepository
///
/// A `LessonRepository` held entirely in process memory, with the same semantics as
/// the Postgres store. Lessons and links live in separate tables behind one
/// `RwLock`; each write takes the write lock once, which gives the same
/// all-or-nothing visibility a transaction does.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<MemoryTables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of link rows referencing `lesson_id`. Zero after a cascade delete.
    pub async fn link_row_count(&self, lesson_id: Uuid) -> usize {
        let tables = self.tables.read().await;
        tables.links.iter().filter(|l| l.lesson_id == lesson_id).count()
    }

    /// Total number of lesson rows, regardless of visibility.
    pub async fn lesson_count(&self) -> usize {
        self.tables.read().await.lessons.len()
    }
}

#[async_trait]
impl LessonRepository for InMemoryRepository {
    async fn find_lessons(
        &self,
        filter: &LessonFilter,
        sort: LessonSort,
    ) -> Result<Vec<Lesson>, StoreError> {
        let tables = self.tables.read().await;
        let mut found: Vec<Lesson> = tables
            .lessons
            .iter()
            .filter(|row| filter.matches(row))
            .map(|row| tables.assemble(row))
            .collect();
        found.sort_by(|a, b| compare_lessons(a, b, sort));
        Ok(found)
    }

    async fn find_lesson(&self, id: Uuid) -> Result<Lesson, StoreError> {
        let tables = self.tables.read().await;
        tables
            .lessons
            .iter()
            .find(|row| row.id == id)
            .map(|row| tables.assemble(row))
            .ok_or(StoreError::NotFound)
    }

    async fn create_lesson(
        &self,
        input: LessonInput,
        created_by: &str,
    ) -> Result<Lesson, StoreError> {
        let mut tables = self.tables.write().await;
        let now = tables.tick();
        let id = Uuid::new_v4();

        let row = Lesson {
            id,
            title: input.title,
            description: input.description,
            placement: input.placement,
            pdf_url: input.pdf_url,
            video_url: input.video_url,
            published: input.published.unwrap_or(false),
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            links: Vec::new(),
        };
        if let Some(links) = &input.links {
            tables.insert_links(id, links);
        }
        let lesson = tables.assemble(&row);
        tables.lessons.push(row);
        Ok(lesson)
    }

    async fn update_lesson(&self, id: Uuid, input: LessonInput) -> Result<Lesson, StoreError> {
        let mut tables = self.tables.write().await;
        let now = tables.tick();

        let position = tables
            .lessons
            .iter()
            .position(|row| row.id == id)
            .ok_or(StoreError::NotFound)?;

        {
            let row = &mut tables.lessons[position];
            row.title = input.title;
            row.description = input.description;
            row.placement = input.placement;
            row.pdf_url = input.pdf_url;
            row.video_url = input.video_url;
            if let Some(published) = input.published {
                row.published = published;
            }
            row.updated_at = now;
        }

        if let Some(links) = &input.links {
            tables.links.retain(|l| l.lesson_id != id);
            tables.insert_links(id, links);
        }

        let row = tables.lessons[position].clone();
        Ok(tables.assemble(&row))
    }

    async fn delete_lesson(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.lessons.len();
        tables.lessons.retain(|row| row.id != id);
        if tables.lessons.len() == before {
            return Err(StoreError::NotFound);
        }
        tables.links.retain(|l| l.lesson_id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(level: Option<&str>, year: Option<&str>, grade: Option<&str>) -> LessonRow {
        LessonRow {
            id: Uuid::new_v4(),
            title: "Ohm's law".to_string(),
            description: None,
            subject: "Physique".to_string(),
            grade: grade.map(str::to_string),
            level: level.map(str::to_string),
            year: year.map(str::to_string),
            chapter: None,
            lesson_type: None,
            sort_order: 3,
            pdf_url: None,
            video_url: None,
            published: true,
            created_by: "user_1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn curriculum_row_normalizes_with_default_type() {
        let lesson = row(Some("Lycée"), Some("1ère"), None)
            .into_lesson(vec![])
            .unwrap();
        match lesson.placement {
            Placement::Curriculum(c) => {
                assert_eq!(c.lesson_type, DEFAULT_LESSON_TYPE);
                assert_eq!(c.order, 3);
            }
            other => panic!("expected curriculum placement, got {:?}", other),
        }
    }

    #[test]
    fn legacy_grade_row_normalizes() {
        let lesson = row(None, None, Some("Grade 10")).into_lesson(vec![]).unwrap();
        assert_eq!(lesson.placement.grade(), Some("Grade 10"));
        assert_eq!(lesson.placement.order(), 0);
    }

    #[test]
    fn row_with_level_but_no_year_falls_back_to_grade() {
        let lesson = row(Some("Lycée"), None, Some("Grade 9"))
            .into_lesson(vec![])
            .unwrap();
        assert_eq!(lesson.placement.grade(), Some("Grade 9"));
    }

    #[test]
    fn row_without_placement_is_corrupt() {
        let result = row(Some("Lycée"), None, None).into_lesson(vec![]);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }
}
