use std::collections::HashMap;

use tokio::sync::mpsc;

use super::signaling::ServerMessage;

pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// A client connection as seen by a session room
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub outbox: Outbox,
}

impl Connection {
    pub fn new(id: impl Into<String>, outbox: Outbox) -> Self {
        Self {
            id: id.into(),
            outbox,
        }
    }

    /// Never waits; false once the receiving side is gone
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbox.send(message).is_ok()
    }
}

/// Who a snapshot or message is shaped for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Teacher,
    Participant(String),
}

/// The set of connections attached to one session.
///
/// Teachers see aggregates and identities; each participant only ever
/// receives messages addressed to everyone or to them alone.
#[derive(Debug, Default)]
pub struct Room {
    teachers: Vec<Connection>,
    participants: HashMap<String, Connection>,
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_teacher(&mut self, connection: Connection) {
        self.teachers.retain(|c| c.id != connection.id);
        self.teachers.push(connection);
    }

    /// Binds (or rebinds after a reconnect) a participant's connection
    pub fn attach_participant(&mut self, participant_id: &str, connection: Connection) {
        self.participants
            .insert(participant_id.to_string(), connection);
    }

    /// Drops every binding that uses this connection
    pub fn detach(&mut self, connection_id: &str) -> usize {
        let before = self.teachers.len() + self.participants.len();
        self.teachers.retain(|c| c.id != connection_id);
        self.participants.retain(|_, c| c.id != connection_id);
        before - (self.teachers.len() + self.participants.len())
    }

    pub fn teacher_count(&self) -> usize {
        self.teachers.len()
    }

    pub fn connected_participants(&self) -> usize {
        self.participants.len()
    }

    pub fn to_teachers(&mut self, message: ServerMessage) {
        let kind = message.kind();
        self.teachers.retain(|c| {
            let delivered = c.send(message.clone());
            if !delivered {
                tracing::warn!(connection_id = %c.id, kind, "Teacher connection closed, detaching");
            }
            delivered
        });
    }

    pub fn to_participant(&mut self, participant_id: &str, message: ServerMessage) {
        let kind = message.kind();
        let closed = match self.participants.get(participant_id) {
            Some(connection) => !connection.send(message),
            None => false,
        };
        if closed {
            tracing::warn!(participant_id = %participant_id, kind, "Participant connection closed, detaching");
            self.participants.remove(participant_id);
        }
    }

    /// Sends a per-participant message built from their id
    pub fn to_each_participant<F>(&mut self, mut build: F)
    where
        F: FnMut(&str) -> Option<ServerMessage>,
    {
        let mut closed = Vec::new();
        for (participant_id, connection) in &self.participants {
            if let Some(message) = build(participant_id) {
                if !connection.send(message) {
                    closed.push(participant_id.clone());
                }
            }
        }
        for participant_id in closed {
            tracing::warn!(participant_id = %participant_id, "Participant connection closed, detaching");
            self.participants.remove(&participant_id);
        }
    }

    pub fn to_participants(&mut self, message: ServerMessage) {
        self.to_each_participant(|_| Some(message.clone()));
    }

    pub fn to_all(&mut self, message: ServerMessage) {
        self.to_teachers(message.clone());
        self.to_participants(message);
    }
}
