//! Typed client for the lesson API, and the admin form state that drives it.

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use crate::{
    auth::DEV_USER_HEADER,
    browse::{BrowseQuery, BrowseSection},
    error::ErrorBody,
    models::{DeleteResponse, Lesson, LessonPayload, LessonQuery, LinkInput},
};

/// ClientError
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base url: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status and an error body.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Credentials sent with each request.
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    #[default]
    Anonymous,
    /// A session JWT from the identity provider.
    Bearer(String),
    /// The local-development `x-user-id` bypass.
    DevUser(String),
}

/// LessonClient
#[derive(Debug, Clone)]
pub struct LessonClient {
    http: reqwest::Client,
    base: Url,
    credentials: Credentials,
}

impl LessonClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)?;
        // `Url::join` drops the last path segment unless it ends with '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            credentials: Credentials::Anonymous,
        })
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Anonymous => request,
            Credentials::Bearer(token) => request.bearer_auth(token),
            Credentials::DevUser(id) => request.header(DEV_USER_HEADER, id),
        }
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn list(&self, query: &LessonQuery) -> Result<Vec<Lesson>, ClientError> {
        let request = self.http.get(self.endpoint("lessons")?).query(query);
        Self::read(self.authorize(request).send().await?).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Lesson, ClientError> {
        let request = self.http.get(self.endpoint(&format!("lessons/{id}"))?);
        Self::read(self.authorize(request).send().await?).await
    }

    pub async fn browse(&self, query: &BrowseQuery) -> Result<Vec<BrowseSection>, ClientError> {
        let request = self.http.get(self.endpoint("browse")?).query(query);
        Self::read(self.authorize(request).send().await?).await
    }

    pub async fn create(&self, payload: &LessonPayload) -> Result<Lesson, ClientError> {
        let request = self.http.post(self.endpoint("lessons")?).json(payload);
        Self::read(self.authorize(request).send().await?).await
    }

    pub async fn update(&self, id: Uuid, payload: &LessonPayload) -> Result<Lesson, ClientError> {
        let request = self
            .http
            .put(self.endpoint(&format!("lessons/{id}"))?)
            .json(payload);
        Self::read(self.authorize(request).send().await?).await
    }

    /// First half of a deletion. Nothing is sent until `PendingDelete::confirm`.
    pub fn request_delete(&self, id: Uuid) -> PendingDelete<'_> {
        PendingDelete { client: self, id }
    }

    async fn delete(&self, id: Uuid) -> Result<DeleteResponse, ClientError> {
        let request = self.http.delete(self.endpoint(&format!("lessons/{id}"))?);
        Self::read(self.authorize(request).send().await?).await
    }
}

/// PendingDelete
///
/// A deletion awaiting explicit confirmation. Dropping it (or `cancel`) sends nothing.
#[must_use = "a pending delete does nothing until confirmed"]
pub struct PendingDelete<'a> {
    client: &'a LessonClient,
    id: Uuid,
}

impl PendingDelete<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn confirm(self) -> Result<DeleteResponse, ClientError> {
        self.client.delete(self.id).await
    }

    pub fn cancel(self) {}
}

/// LessonForm
///
/// Local admin form state: the payload being edited, the link currently being typed,
/// and which lesson (if any) is being edited.
#[derive(Debug, Clone, Default)]
pub struct LessonForm {
    editing: Option<Uuid>,
    pub payload: LessonPayload,
    pub pending_link: LinkInput,
}

impl LessonForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// A form pre-filled from an existing lesson; `submit` will update it.
    pub fn edit(lesson: &Lesson) -> Self {
        Self {
            editing: Some(lesson.id),
            payload: LessonPayload::from(lesson),
            pending_link: LinkInput::default(),
        }
    }

    pub fn editing(&self) -> Option<Uuid> {
        self.editing
    }

    pub fn links(&self) -> &[LinkInput] {
        self.payload.links.as_deref().unwrap_or_default()
    }

    /// Moves the pending link into the link list. Ignored unless both fields are filled.
    pub fn add_link(&mut self) -> bool {
        if self.pending_link.title.trim().is_empty() || self.pending_link.url.trim().is_empty() {
            return false;
        }
        let link = std::mem::take(&mut self.pending_link);
        self.payload.links.get_or_insert_with(Vec::new).push(link);
        true
    }

    pub fn remove_link(&mut self, index: usize) -> Option<LinkInput> {
        let links = self.payload.links.as_mut()?;
        (index < links.len()).then(|| links.remove(index))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Sends a single create or update, then re-fetches the management list from
    /// the API. The form is reset only on success.
    pub async fn submit(&mut self, client: &LessonClient) -> Result<Vec<Lesson>, ClientError> {
        // The link list is always sent, so an emptied list clears the stored links.
        if self.payload.links.is_none() {
            self.payload.links = Some(Vec::new());
        }

        match self.editing {
            Some(id) => client.update(id, &self.payload).await?,
            None => client.create(&self.payload).await?,
        };
        self.reset();
        client.list(&LessonQuery::default()).await
    }
}
