//! Native WebSocket connector using tokio-tungstenite.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::COOKIE, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::{CloseInfo, ConnectError, Connector, LinkDriver, SocketEvent, SocketLink};

type CookieSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Opens the notification socket, attaching the session cookie to each upgrade.
///
/// The handshake is not bounded here; the connection manager applies its own
/// connect timeout around every attempt.
#[derive(Clone, Default)]
pub struct TungsteniteConnector {
    /// Called on every connect so a refreshed session is picked up.
    cookies: Option<CookieSource>,
}

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie_source(
        mut self,
        cookies: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.cookies = Some(Arc::new(cookies));
        self
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<SocketLink, ConnectError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ConnectError::Transport(e.to_string()))?;

        if let Some(cookie) = self.cookies.as_ref().and_then(|source| source()) {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| ConnectError::Transport(format!("invalid cookie header: {e}")))?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(|e| match e {
                WsError::Http(response)
                    if response.status() == StatusCode::UNAUTHORIZED
                        || response.status() == StatusCode::FORBIDDEN =>
                {
                    ConnectError::Unauthorized
                }
                other => ConnectError::Transport(other.to_string()),
            })?;

        tracing::debug!(url, "notification socket handshake complete");

        let (link, driver) = SocketLink::channel();
        tokio::spawn(pump(ws_stream, driver));
        Ok(link)
    }
}

/// Forward socket frames to the manager until either side closes.
async fn pump<S>(mut ws_stream: S, driver: LinkDriver)
where
    S: futures_util::Stream<Item = Result<Message, WsError>>
        + futures_util::Sink<Message, Error = WsError>
        + Unpin,
{
    let LinkDriver {
        events,
        mut close_requested,
    } = driver;
    let mut close_frame: Option<CloseInfo> = None;

    loop {
        tokio::select! {
            _ = &mut close_requested => {
                let _ = ws_stream.close().await;
                tracing::debug!("notification socket closed by client");
                return;
            }
            frame = ws_stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if events.send(SocketEvent::Text(text.as_str().to_owned())).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    close_frame = Some(match frame {
                        Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.as_str()),
                        None => CloseInfo::abnormal(),
                    });
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite; binary frames are not
                    // part of the protocol.
                }
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "notification socket read error");
                    break;
                }
                None => break,
            }
        }
    }

    let info = close_frame.unwrap_or_else(CloseInfo::abnormal);
    let _ = events.send(SocketEvent::Closed(info));
}
