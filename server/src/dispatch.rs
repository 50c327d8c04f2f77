use std::sync::Arc;
use std::time::Duration;

use classroom_system::serde_json::Value;
use classroom_system::{
    Course, CourseMode, CourseModeSelection, CourseSelection, ErrorKind, Message, MessageType,
    ObjectManipulation,
};
use serde::Deserialize;
use tokio::sync::MutexGuard;

use crate::connection_handle::{ConnectionHandle, Delivery, SessionSlot};
use crate::hub::{HubClosed, HubHandle};
use crate::server_state::ServerState;

type HandlerResult = Result<(), ErrorKind>;

impl From<HubClosed> for ErrorKind {
    fn from(_: HubClosed) -> Self {
        ErrorKind::InternalError
    }
}

fn parse<'a, T: Deserialize<'a>>(data: &'a Value) -> Result<T, ErrorKind> {
    T::deserialize(data).map_err(|err| {
        log::warn!("Invalid payload: {}", err);
        ErrorKind::InvalidData
    })
}

/// Locks the connection's session slot, refusing once the hub has retired it.
/// Held across course registry writes so a retired connection changes nothing.
async fn open_slot(from: &ConnectionHandle) -> Result<MutexGuard<'_, SessionSlot>, ErrorKind> {
    let slot = from.session_slot().await;
    if slot.is_closed() {
        return Err(ErrorKind::InternalError);
    }
    Ok(slot)
}

/// Business logic for inbound messages. Runs on each connection's inbound
/// pump, concurrently across connections.
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<ServerState>,
    hub: HubHandle,
}

impl Dispatcher {
    pub fn new(state: Arc<ServerState>, hub: HubHandle) -> Self {
        Self { state, hub }
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Decode failures are logged and skipped; the connection stays open.
    pub async fn dispatch(&self, from: &ConnectionHandle, text: &str) {
        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("Dropping undecodable frame from {}: {}", from.id, err);
                return;
            }
        };

        let result = match message.kind {
            MessageType::Heartbeat => self.heartbeat(from).await,
            MessageType::CourseSelection => self.select_course(from, &message.data).await,
            MessageType::CourseModeSelection => self.select_mode(from, &message.data).await,
            MessageType::ObjectManipulation => self.manipulate(message.data).await,
            MessageType::CourseExit => self.exit_course(from).await,
            other => {
                log::debug!("Ignoring {:?} from {}", other, from.id);
                Ok(())
            }
        };

        if let Err(kind) = result {
            log::warn!("{:?} from {} failed: {}", message.kind, from.id, kind);
            self.unicast(from, &Message::error(kind)).await;
        }
    }

    async fn heartbeat(&self, from: &ConnectionHandle) -> HandlerResult {
        log::debug!("Heartbeat from {}", from.id);
        self.unicast(from, &Message::heartbeat_response()).await;
        Ok(())
    }

    async fn select_course(&self, from: &ConnectionHandle, data: &Value) -> HandlerResult {
        let selection: CourseSelection = parse(data)?;
        if selection.course_id.is_empty() {
            return Err(ErrorKind::InvalidData);
        }

        let mut slot = open_slot(from).await?;
        let course = self.state.courses.get_or_create(&selection.course_id).await;
        self.bind_session(&mut slot, from, course).await;
        drop(slot);
        self.state
            .course_detail
            .write()
            .await
            .select_course(&selection.course_id);

        self.broadcast(&Message::course_selected(&selection.course_id))
            .await
    }

    async fn select_mode(&self, from: &ConnectionHandle, data: &Value) -> HandlerResult {
        let selection: CourseModeSelection = parse(data)?;
        let mode = CourseMode::try_from(selection.mode).map_err(|err| {
            log::warn!("{}", err);
            ErrorKind::InvalidData
        })?;
        let duration = Duration::from_secs(selection.duration.unwrap_or(0));

        let mut slot = open_slot(from).await?;
        let course = self
            .state
            .courses
            .update(&selection.course_id, mode, duration)
            .await
            .ok_or(ErrorKind::CourseNotFound)?;
        self.bind_session(&mut slot, from, course).await;
        drop(slot);
        self.state
            .course_detail
            .write()
            .await
            .start_course(&selection.course_id, mode);

        self.broadcast(&Message::course_start(&selection.course_id, mode))
            .await
    }

    async fn manipulate(&self, data: Value) -> HandlerResult {
        let manipulation: ObjectManipulation = parse(&data)?;
        {
            let mut detail = self.state.course_detail.write().await;
            if !detail.is_active() {
                return Err(ErrorKind::CourseNotFound);
            }
            detail.merge_attachments(manipulation.data_attachment);
        }
        self.broadcast(&Message::object_manipulation(data)).await
    }

    async fn exit_course(&self, from: &ConnectionHandle) -> HandlerResult {
        let ended = from.session_slot().await.take_active();
        if let Some(session_id) = ended {
            self.state.sessions.end(&session_id).await;
        }
        self.state.course_detail.write().await.clear();
        log::info!("Course exited by {} and course detail cleared", from.user.id);

        self.broadcast(&Message::course_exit()).await
    }

    /// Ends the connection's previous session and starts one on `course`.
    async fn bind_session(
        &self,
        slot: &mut SessionSlot,
        from: &ConnectionHandle,
        course: Course,
    ) {
        if let Some(previous) = slot.take_active() {
            self.state.sessions.end(&previous).await;
        }
        let session_id = self.state.sessions.create(from.user.clone(), course).await;
        *slot = SessionSlot::Active(session_id);
    }

    async fn broadcast(&self, message: &Message) -> HandlerResult {
        let text = message.encode().map_err(|err| {
            log::error!("Failed to encode {:?}: {}", message.kind, err);
            ErrorKind::InternalError
        })?;
        self.hub.broadcast(text.into()).await?;
        Ok(())
    }

    async fn unicast(&self, to: &ConnectionHandle, message: &Message) {
        let text = match message.encode() {
            Ok(text) => text,
            Err(err) => {
                log::error!("Failed to encode {:?}: {}", message.kind, err);
                return;
            }
        };
        match to.deliver(text.into()) {
            Delivery::Queued | Delivery::Closed => {}
            Delivery::Full => {
                log::warn!("Connection {} is not draining its queue", to.id);
                if self.hub.unregister(to.id).await.is_err() {
                    to.close();
                }
            }
        }
    }
}
