//! WebSocket transport implementation backed by `tokio-tungstenite`.
//!
//! Supports both `ws://` and `wss://` schemes. The transport starts
//! connecting the moment it is constructed; the handshake completes when
//! [`next_event`](Transport::next_event) reports `Open`.

use std::future::Future;
use std::pin::Pin;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Response;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{
    HeaderName, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_PROTOCOL,
};
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WireCloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message as WireMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{TransportError, WsError};
use crate::message::{CloseFrame, Message};
use crate::transport::{Transport, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConnectResult = Result<(WsStream, Response), tungstenite::Error>;
type ConnectFuture = Pin<Box<dyn Future<Output = ConnectResult> + Send>>;

enum State {
    Connecting(ConnectFuture),
    Open(WsStream),
    Closed,
}

/// WebSocket transport for the adapter.
pub struct WsTransport {
    state: State,
}

impl WsTransport {
    /// Start connecting to `url`, optionally offering sub-protocol
    /// candidates.
    ///
    /// The endpoint is validated synchronously; an invalid URL fails here
    /// with [`WsError::Construction`] without ever suspending.
    pub fn connect(url: &str, protocols: &[String]) -> Result<Self, WsError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| WsError::Construction(e.to_string()))?;
        if !protocols.is_empty() {
            let value = HeaderValue::from_str(&protocols.join(", "))
                .map_err(|e| WsError::Construction(e.to_string()))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }
        Ok(Self {
            state: State::Connecting(Box::pin(connect_async(request))),
        })
    }
}

impl Transport for WsTransport {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match &mut self.state {
                State::Connecting(fut) => match fut.as_mut().await {
                    Ok((stream, response)) => {
                        let protocol = header_str(&response, SEC_WEBSOCKET_PROTOCOL);
                        let extensions = header_str(&response, SEC_WEBSOCKET_EXTENSIONS);
                        self.state = State::Open(stream);
                        return TransportEvent::Open {
                            protocol,
                            extensions,
                        };
                    }
                    Err(e) => {
                        self.state = State::Closed;
                        return TransportEvent::Error(map_handshake_error(e));
                    }
                },
                State::Open(stream) => match stream.next().await {
                    Some(Ok(WireMessage::Text(text))) => {
                        return TransportEvent::Message(Message::Text(text.to_string()));
                    }
                    Some(Ok(WireMessage::Binary(data))) => {
                        return TransportEvent::Message(Message::Binary(data.to_vec()));
                    }
                    Some(Ok(WireMessage::Close(frame))) => {
                        self.state = State::Closed;
                        let (code, reason) = match frame {
                            Some(f) => (u16::from(f.code), f.reason.to_string()),
                            None => (CloseFrame::NO_STATUS_CODE, String::new()),
                        };
                        return TransportEvent::Closed { code, reason };
                    }
                    // Ping, pong and raw frames are transport noise.
                    Some(Ok(_)) => continue,
                    Some(Err(
                        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                    ))
                    | None => {
                        self.state = State::Closed;
                        return TransportEvent::Closed {
                            code: CloseFrame::ABNORMAL_CODE,
                            reason: String::new(),
                        };
                    }
                    Some(Err(e)) => {
                        self.state = State::Closed;
                        return TransportEvent::Error(map_stream_error(e));
                    }
                },
                State::Closed => {
                    return TransportEvent::Closed {
                        code: CloseFrame::ABNORMAL_CODE,
                        reason: String::new(),
                    };
                }
            }
        }
    }

    async fn send(&mut self, msg: Message) -> Result<(), TransportError> {
        match &mut self.state {
            State::Open(stream) => {
                let wire = match msg {
                    Message::Text(text) => WireMessage::text(text),
                    Message::Binary(data) => WireMessage::binary(data),
                };
                stream.send(wire).await.map_err(map_stream_error)
            }
            _ => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        match &mut self.state {
            State::Open(stream) => {
                let frame = WireCloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.to_string().into(),
                };
                // Keeps reading afterwards: buffered messages and the peer's
                // close ack still arrive through `next_event`.
                match stream.close(Some(frame)).await {
                    Ok(())
                    | Err(
                        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                    ) => Ok(()),
                    Err(e) => Err(map_stream_error(e)),
                }
            }
            State::Connecting(_) => {
                self.state = State::Closed;
                Ok(())
            }
            State::Closed => Ok(()),
        }
    }

    fn abort(&mut self) {
        self.state = State::Closed;
    }
}

fn header_str(response: &Response, name: HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn map_handshake_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::Http(response) => TransportError::Protocol {
            message: format!("handshake rejected: HTTP {}", response.status()),
            close_code: None,
            reason: String::new(),
        },
        tungstenite::Error::Protocol(violation) => TransportError::Protocol {
            message: violation.to_string(),
            close_code: None,
            reason: String::new(),
        },
        other => TransportError::Io(other.to_string()),
    }
}

fn map_stream_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::ConnectionClosed
        }
        tungstenite::Error::Protocol(violation) => TransportError::Protocol {
            message: violation.to_string(),
            close_code: None,
            reason: String::new(),
        },
        other => TransportError::Io(other.to_string()),
    }
}
