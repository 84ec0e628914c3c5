use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use axum::{
    debug_handler,
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::warn;

use super::{
    context::{ConnectionContext, SessionCookies},
    error::RelayError,
    relay::{ChatRelay, Outbox},
};

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    State(relay): State<Arc<ChatRelay>>,
    State(cookies): State<SessionCookies>,
    headers: HeaderMap,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let context = ConnectionContext::from_headers(&headers, &cookies);
    ws.on_upgrade(async move |socket| match context {
        Ok(context) => {
            let (sender, receiver) = socket.split();
            relay_socket(sender, receiver, relay, context).await
        }
        Err(err) => refuse(socket, err).await,
    })
}

async fn refuse(mut socket: WebSocket, err: RelayError) {
    warn!(kind = err.kind(), "{err}, refusing connection");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: err.to_string().into(),
        })))
        .await;
}

async fn relay_socket<S, R>(sender: S, mut receiver: R, relay: Arc<ChatRelay>, context: ConnectionContext)
where
    S: Sink<Message> + Send + Unpin + 'static,
    S::Error: Into<anyhow::Error> + Send,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let write_timeout = relay.settings().write_timeout;
    let (mut conn, outbox) = relay.open(context);
    let mut write_task = tokio::spawn(write_out(sender, outbox, write_timeout));

    let mut closing = false;
    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) => {
                    closing = true;
                    break;
                }
                Some(Ok(frame)) => {
                    relay.on_message(&conn, frame).await;
                }
                Some(Err(err)) => {
                    relay.on_error(&mut conn, err.into());
                    break;
                }
                None => break,
            },
            written = &mut write_task => {
                match written {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => relay.on_error(&mut conn, err),
                    Err(err) => relay.on_error(&mut conn, err.into()),
                }
                break;
            }
        }
    }

    relay.close(&mut conn);
    if closing {
        // the close reply is only flushed by the next read
        let _ = tokio::time::timeout(write_timeout, async { while receiver.next().await.is_some() {} }).await;
    }
    write_task.abort();
}

async fn write_out<S>(mut sender: S, mut outbox: Outbox, write_timeout: Duration) -> anyhow::Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Into<anyhow::Error>,
{
    while let Some(frame) = outbox.recv().await {
        match tokio::time::timeout(write_timeout, sender.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(anyhow!("write to client timed out after {write_timeout:?}")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        pin::Pin,
        task::{Context, Poll},
    };

    use futures_util::stream;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        db,
        rooms::{context::RoomId, relay::RelaySettings, store::SqliteMessageStore},
    };

    struct Stuck;

    impl Sink<Message> for Stuck {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn relay(write_timeout: Duration) -> Arc<ChatRelay> {
        let store = SqliteMessageStore::new(db::connect("sqlite::memory:", 1).await.unwrap());
        let settings = RelaySettings {
            write_timeout,
            ..RelaySettings::default()
        };
        Arc::new(ChatRelay::new(Arc::new(store), settings))
    }

    #[tokio::test]
    async fn frames_are_written_in_order_until_the_outbox_closes() {
        let (tx, outbox) = mpsc::channel(4);
        tx.send(Message::from("one")).await.unwrap();
        tx.send(Message::from("two")).await.unwrap();
        drop(tx);

        let mut written: Vec<Message> = Vec::new();
        write_out(&mut written, outbox, Duration::from_secs(1)).await.unwrap();

        assert_eq!(written, vec![Message::from("one"), Message::from("two")]);
    }

    #[tokio::test]
    async fn stalled_client_times_out() {
        let (tx, outbox) = mpsc::channel(1);
        tx.send(Message::from("hi")).await.unwrap();

        let err = write_out(Stuck, outbox, Duration::from_millis(50)).await.unwrap_err();

        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[tokio::test]
    async fn stalled_client_is_taken_out_of_its_room() {
        let relay = relay(Duration::from_millis(50)).await;
        let room = RoomId::from("abc123");

        let task = tokio::spawn(relay_socket(
            Stuck,
            stream::pending::<Result<Message, axum::Error>>(),
            relay.clone(),
            ConnectionContext::new("abc123", "1"),
        ));
        while relay.registry().members(&room).is_empty() {
            tokio::task::yield_now().await;
        }
        let stuck = relay.registry().members(&room)[0];

        let (other, _outbox) = relay.open(ConnectionContext::new("abc123", "2"));
        let delivery = relay.on_message(&other, Message::from("hello")).await;
        assert_eq!(delivery.delivered, 1);

        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

        assert!(!relay.registry().contains(&room, stuck));
        assert_eq!(relay.registry().members(&room), vec![other.id]);
    }
}
