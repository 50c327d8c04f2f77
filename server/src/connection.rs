use actix::{
    Actor, ActorContext, AsyncContext, Handler, Message, Recipient, Running, StreamHandler,
};
use actix_web::{error, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use classroom_system::User;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::app::AppContext;
use crate::auth::{authenticate, ConnectParams};
use crate::connection_handle::ConnectionHandle;
use crate::pump::{
    inbound_pump, outbound_pump, FrameSink, InboundFrame, OutboundFrame, TransportError,
};

#[derive(Message)]
#[rtype(result = "()")]
struct Egress(OutboundFrame);

/// Writes through the actor that owns the WebSocket.
struct ActorSink {
    addr: Recipient<Egress>,
}

impl FrameSink for ActorSink {
    async fn write(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.addr
            .send(Egress(frame))
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn shutdown(&mut self) {
        self.addr.do_send(Egress(OutboundFrame::Close));
    }
}

struct ConnectionActor {
    user: User,
    is_main: bool,
    app: AppContext,
    ingress: Option<mpsc::Sender<InboundFrame>>,
}

impl ConnectionActor {
    fn new(user: User, is_main: bool, app: AppContext) -> Self {
        Self {
            user,
            is_main,
            app,
            ingress: None,
        }
    }

    fn forward(&mut self, frame: InboundFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match push_ingress(self.ingress.as_ref(), frame) {
            Ingress::Open => {}
            Ingress::Flooded => {
                log::warn!("User {} is flooding the connection", self.user.id);
                ctx.stop();
            }
            Ingress::Closing => ctx.stop(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ingress {
    Open,
    /// The inbound pump is too far behind.
    Flooded,
    Closing,
}

fn push_ingress(ingress: Option<&mpsc::Sender<InboundFrame>>, frame: InboundFrame) -> Ingress {
    let closing = frame == InboundFrame::Close;
    if let Some(ingress) = ingress {
        if let Err(TrySendError::Full(_)) = ingress.try_send(frame) {
            return Ingress::Flooded;
        }
    }
    if closing {
        Ingress::Closing
    } else {
        Ingress::Open
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (connection, queue) =
            ConnectionHandle::new(self.user.clone(), self.is_main, self.app.send_queue);
        let (ingress_tx, ingress_rx) = mpsc::channel(self.app.inbound_queue.max(1));
        self.ingress = Some(ingress_tx);

        let settings = self.app.pump_settings;
        let sink = ActorSink {
            addr: ctx.address().recipient(),
        };
        tokio::spawn(async move {
            let exit = outbound_pump(queue, sink, settings).await;
            log::debug!("outbound pump - terminated ({:?})", exit);
        });

        let dispatcher = self.app.dispatcher.clone();
        tokio::spawn(async move {
            log::info!("connection {} - started", connection.id);
            if let Err(err) = dispatcher.hub().register(connection.clone()).await {
                log::error!("Cannot register connection {}: {}", connection.id, err);
                connection.close();
                return;
            }
            inbound_pump(connection.clone(), ingress_rx, dispatcher, settings.pong_wait).await;
            log::info!("connection {} - terminated", connection.id);
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.ingress.take();
        Running::Stop
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let frame = match msg {
            Ok(ws::Message::Text(text)) => InboundFrame::Text(text.to_string()),
            Ok(ws::Message::Binary(bin)) => match String::from_utf8(bin.to_vec()) {
                Ok(text) => InboundFrame::Text(text),
                Err(_) => {
                    log::warn!("Ignoring non UTF-8 binary frame from {}", self.user.id);
                    return;
                }
            },
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
                InboundFrame::Alive
            }
            Ok(ws::Message::Pong(_)) => InboundFrame::Alive,
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                InboundFrame::Close
            }
            Ok(ws::Message::Continuation(_)) => {
                log::warn!("Ignoring fragmented frame from {}", self.user.id);
                return;
            }
            Ok(ws::Message::Nop) => return,
            Err(err) => {
                log::error!("Unexpected close error from {}: {}", self.user.id, err);
                InboundFrame::Close
            }
        };
        self.forward(frame, ctx);
    }
}

/// Egress
impl Handler<Egress> for ConnectionActor {
    type Result = ();

    fn handle(&mut self, msg: Egress, ctx: &mut ws::WebsocketContext<Self>) -> Self::Result {
        match msg.0 {
            OutboundFrame::Text(text) => ctx.text(text),
            OutboundFrame::Ping => ctx.ping(b""),
            OutboundFrame::Close => {
                ctx.close(None);
                ctx.stop();
            }
        }
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    params: web::Query<ConnectParams>,
    app: web::Data<AppContext>,
) -> Result<HttpResponse, Error> {
    let user = authenticate(&params).map_err(|err| {
        log::error!("User authentication failed: {}", err);
        error::ErrorUnauthorized(err.to_string())
    })?;
    let max_message_size = app.max_message_size;
    let actor = ConnectionActor::new(user, params.main, app.get_ref().clone());
    ws::WsResponseBuilder::new(actor, &req, stream)
        .frame_size(max_message_size)
        .start()
}
