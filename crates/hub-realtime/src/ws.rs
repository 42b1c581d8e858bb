//! WebSocket push link.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use hub_core::Notification;
use tokio::net::TcpStream;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

use crate::{Connector, PushFrame, PushLink, StreamError, StreamResult};

/// Query parameter carrying the credential for servers that cannot read
/// handshake headers.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// [`Connector`] for the realtime service over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    ping_interval: Option<Duration>,
}

impl WsConnector {
    /// Create a connector for `url`. `http(s)` origins are mapped to `ws(s)`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url: websocket_url(url),
            ping_interval: None,
        }
    }

    /// Send a ping frame at this interval while connected.
    #[must_use]
    pub const fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Endpoint URL without credential.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Build the handshake request: bearer header plus query fallback.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotAuthenticated`] for an empty token,
    /// [`StreamError::ConnectionFailed`] if the token is not a valid header
    /// value, and [`StreamError::WebSocketError`] for a non-WebSocket URL.
    pub fn handshake_request(&self, token: &str) -> StreamResult<Request> {
        if token.is_empty() {
            return Err(StreamError::NotAuthenticated);
        }
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);

        let mut request = url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| StreamError::ConnectionFailed(format!("invalid credential: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        Ok(request)
    }
}

fn websocket_url(mut url: Url) -> Url {
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return url,
    };
    if url.set_scheme(scheme).is_err() {
        warn!(url = %url, "Could not map realtime origin to a WebSocket scheme");
    }
    url
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, token: &str) -> StreamResult<Box<dyn PushLink>> {
        let request = self.handshake_request(token)?;
        debug!(url = %self.url, "Opening realtime WebSocket");
        let (stream, _response) = connect_async(request).await?;
        Ok(Box::new(WsLink::new(stream, self.ping_interval)))
    }
}

/// Live WebSocket connection yielding notifications.
pub struct WsLink {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ping: Option<Interval>,
    closed: bool,
}

impl WsLink {
    fn new(inner: WebSocketStream<MaybeTlsStream<TcpStream>>, ping_interval: Option<Duration>) -> Self {
        let ping = ping_interval.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self {
            inner,
            ping,
            closed: false,
        }
    }

    /// Handle one message; `Some` ends the wait.
    fn on_message(&mut self, message: Message) -> Option<StreamResult<Option<Notification>>> {
        let text = match message {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    warn!(len = bytes.len(), "Skipping non-UTF-8 binary frame");
                    return None;
                }
            },
            Message::Close(frame) => {
                self.closed = true;
                debug!(
                    code = frame.as_ref().map(|f| u16::from(f.code)),
                    "Realtime peer closed the connection"
                );
                return Some(close_error(frame.as_ref()).map_or(Ok(None), Err));
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return None,
        };

        match PushFrame::decode(&text) {
            Ok(PushFrame::Notification(notification)) => Some(Ok(Some(notification))),
            Ok(PushFrame::Other { event }) => {
                debug!(event = %event, "Ignoring push event");
                None
            }
            Err(e) => {
                warn!(error = %e, "Skipping malformed push frame");
                None
            }
        }
    }
}

/// Anything but a normal closure is reported with the peer's code and
/// reason.
fn close_error(frame: Option<&CloseFrame>) -> Option<StreamError> {
    let frame = frame?;
    if frame.code == CloseCode::Normal {
        return None;
    }
    let code = u16::from(frame.code);
    let reason = match frame.reason.as_str() {
        "" => format!("close code {code}"),
        reason => reason.to_owned(),
    };
    Some(StreamError::ConnectionClosed {
        reason,
        code: Some(code),
    })
}

async fn tick(ping: &mut Option<Interval>) {
    if let Some(interval) = ping {
        interval.tick().await;
    }
}

#[async_trait]
impl PushLink for WsLink {
    async fn next_notification(&mut self) -> StreamResult<Option<Notification>> {
        loop {
            if self.closed {
                return Ok(None);
            }
            let has_ping = self.ping.is_some();
            let received = tokio::select! {
                message = self.inner.next() => Some(message),
                () = tick(&mut self.ping), if has_ping => None,
            };

            match received {
                None => self.inner.send(Message::Ping(Vec::new().into())).await?,
                Some(Some(Ok(message))) => {
                    if let Some(result) = self.on_message(message) {
                        return result;
                    }
                }
                Some(Some(Err(e))) => {
                    self.closed = true;
                    return Err(e.into());
                }
                Some(None) => {
                    self.closed = true;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.close(None).await {
            debug!(error = %e, "Error while closing realtime WebSocket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_origin_maps_to_ws() {
        let connector = WsConnector::new("https://rt.example.com/socket".parse().unwrap());
        assert_eq!(connector.url().as_str(), "wss://rt.example.com/socket");

        let connector = WsConnector::new("http://localhost:4000".parse().unwrap());
        assert_eq!(connector.url().scheme(), "ws");
    }

    #[test]
    fn handshake_carries_header_and_query() {
        let connector = WsConnector::new("wss://rt.example.com/socket".parse().unwrap());
        let request = connector.handshake_request("abc").unwrap();

        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer abc"
        );
        assert_eq!(request.uri().query(), Some("token=abc"));
    }

    #[test]
    fn empty_token_is_rejected() {
        let connector = WsConnector::new("wss://rt.example.com".parse().unwrap());
        assert!(matches!(
            connector.handshake_request(""),
            Err(StreamError::NotAuthenticated)
        ));
    }

    #[test]
    fn only_abnormal_close_is_an_error() {
        assert!(close_error(None).is_none());
        let normal = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        assert!(close_error(Some(&normal)).is_none());

        let restart = CloseFrame {
            code: CloseCode::Restart,
            reason: "".into(),
        };
        match close_error(Some(&restart)) {
            Some(StreamError::ConnectionClosed { reason, code }) => {
                assert_eq!(reason, "close code 1012");
                assert_eq!(code, Some(1012));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn control_characters_in_token_are_rejected() {
        let connector = WsConnector::new("wss://rt.example.com".parse().unwrap());
        assert!(matches!(
            connector.handshake_request("bad\ntoken"),
            Err(StreamError::ConnectionFailed(_))
        ));
    }
}
