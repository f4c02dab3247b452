//! `DeviceDriver` and `ScreenSource` on top of the Appium session.

use std::time::Duration;

use async_trait::async_trait;

use crate::device::actions;
use crate::device::session::DeviceSession;
use crate::errors::{SeeTapError, SeeTapResult};
use crate::executor::driver::DeviceDriver;
use crate::perception::traits::ScreenSource;
use crate::perception::types::{Point, ScreenCapture};

#[async_trait]
impl DeviceDriver for DeviceSession {
    async fn tap(&self, at: Point) -> SeeTapResult<()> {
        self.perform_actions(actions::tap(at)).await
    }

    async fn long_press(&self, at: Point, hold: Duration) -> SeeTapResult<()> {
        self.perform_actions(actions::long_press(at, hold)).await
    }

    async fn swipe(&self, from: Point, to: Point) -> SeeTapResult<()> {
        self.perform_actions(actions::swipe(from, to, self.swipe_hold_ms)).await
    }

    async fn tap_element(&self, label: &str) -> SeeTapResult<()> {
        let id = self.find_element(label).await?;
        self.click_element(&id).await
    }

    async fn send_keys(&self, label: &str, text: &str) -> SeeTapResult<()> {
        let id = self.find_element(label).await?;
        self.click_element(&id).await?;
        self.send_keys_to(&id, text).await
    }
}

#[async_trait]
impl ScreenSource for DeviceSession {
    async fn capture_screen(&self) -> SeeTapResult<ScreenCapture> {
        let as_capture = |e: SeeTapError| match e {
            SeeTapError::Session(_) | SeeTapError::Capture(_) => e,
            other => SeeTapError::Capture(other.to_string()),
        };
        let image_bytes = self.screenshot().await.map_err(as_capture)?;
        let (width, height) = self.window_size().await.map_err(as_capture)?;
        tracing::debug!(bytes = image_bytes.len(), width, height, "screen captured");
        Ok(ScreenCapture {
            image_bytes,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn tap_posts_pointer_actions_then_releases() {
        let server = MockServer::start_async().await;
        let perform = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/session/s1/actions")
                    .body_includes("\"pointerType\":\"touch\"")
                    .body_includes("\"x\":30");
                then.status(200).json_body(json!({ "value": null }));
            })
            .await;
        let release = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/session/s1/actions");
                then.status(200).json_body(json!({ "value": null }));
            })
            .await;

        let session = DeviceSession::attach(&server.base_url(), "s1", 5).unwrap();
        DeviceDriver::tap(&session, Point::new(30, 20)).await.unwrap();
        perform.assert_async().await;
        release.assert_async().await;
    }

    #[tokio::test]
    async fn send_keys_focuses_then_types() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/session/s1/element");
                then.status(200).json_body(json!({ "value": { "ELEMENT": "e9" } }));
            })
            .await;
        let click = server
            .mock_async(|when, then| {
                when.method(POST).path("/session/s1/element/e9/click");
                then.status(200).json_body(json!({ "value": null }));
            })
            .await;
        let value = server
            .mock_async(|when, then| {
                when.method(POST).path("/session/s1/element/e9/value").body_includes("hunter2");
                then.status(200).json_body(json!({ "value": null }));
            })
            .await;

        let session = DeviceSession::attach(&server.base_url(), "s1", 5).unwrap();
        DeviceDriver::send_keys(&session, "password", "hunter2").await.unwrap();
        click.assert_async().await;
        value.assert_async().await;
    }

    #[tokio::test]
    async fn capture_failure_is_a_capture_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/session/s1/screenshot");
                then.status(500).json_body(json!({
                    "value": { "error": "unknown error", "message": "xcuitest crashed" }
                }));
            })
            .await;

        let session = DeviceSession::attach(&server.base_url(), "s1", 5).unwrap();
        let err = session.capture_screen().await.unwrap_err();
        assert!(matches!(err, SeeTapError::Capture(_)));
        assert!(err.is_fatal());
    }
}
