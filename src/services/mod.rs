/// Chat access evaluation for a fixture.
pub mod access_service;
/// Room engine: messages, reactions, taps and live room feeds.
pub mod chat_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Viewer presence with heartbeats and stale sweeping.
pub mod presence_service;
/// Room operations behind the HTTP surface.
pub mod room_service;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Chat store connection supervisor driving degraded mode.
pub mod storage_supervisor;
/// Provider polling and snapshot assembly.
pub mod sync_service;
