use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use chrono::Utc;
use hyper::{Request, Response};

use super::{header_map, read_body};
use crate::{
    core::{router::Router, service::Service},
    ports::{
        handler::{ApiHandler, HandlerError, HandlerKind},
        publisher::Event,
    },
};

/// Turns every request into an event on `{namespace}.{first segment}`.
///
/// The remaining segments joined by `.` become the event name and the raw
/// body its payload. The caller gets an empty 200 once the event is published.
pub struct EventHandler {
    router: Arc<Router>,
    service: Arc<Service>,
}

impl EventHandler {
    pub fn new(router: Arc<Router>, service: Arc<Service>) -> Self {
        Self { router, service }
    }

    fn topic_and_name(&self, path: &str) -> Result<(String, String), HandlerError> {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        let topic = parts
            .next()
            .ok_or_else(|| HandlerError::BadRequest("event topic is missing".to_string()))?;
        let name = parts.collect::<Vec<_>>().join(".");

        let namespace = self.router.namespace();
        let topic = if namespace.is_empty() {
            topic.to_string()
        } else {
            format!("{namespace}.{topic}")
        };
        Ok((topic, name))
    }
}

#[async_trait]
impl ApiHandler for EventHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Event
    }

    async fn serve(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>, HandlerError> {
        let (topic, name) = self.topic_and_name(req.uri().path())?;
        let (parts, body) = req.into_parts();
        let data = read_body(body).await?;

        let event = Event {
            id: uuid::Uuid::new_v4().to_string(),
            topic,
            name,
            timestamp: Utc::now(),
            header: header_map(&parts.headers),
            data: String::from_utf8_lossy(&data).into_owned(),
        };

        self.service
            .publisher()
            .publish(event)
            .await
            .map_err(|e| HandlerError::InternalError(e.to_string()))?;

        Ok(Response::new(AxumBody::empty()))
    }
}
