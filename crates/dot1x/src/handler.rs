//! Packet-path entry points.
//!
//! Each `handle_*` method corresponds to one kind of message arriving at
//! the authenticator and drives the session registry and the reaper the
//! way that message requires:
//!   1. EAPOL-Start from a supplicant → [`AuthService::handle_start`]
//!   2. EAP identity response → [`AuthService::handle_identity`]
//!   3. Accept / reject from the server → [`AuthService::handle_server_response`]
//!   4. EAPOL-Logoff → [`AuthService::handle_logoff`]
//!
//! Frame parsing stays with the caller; these take already-decoded values.

use std::sync::Arc;

use dot1x_session::{Session, SessionError, SessionState, Transition};
use dot1x_types::{AttachmentPoint, CorrelationId, MacAddress, SessionKey};

use crate::{AuthService, Dot1xError};

impl AuthService {
    /// A supplicant on `point` started (or restarted) authentication.
    ///
    /// Reuses the session already registered for the port, if any, and
    /// creates one otherwise. The session gets a fresh correlation id and
    /// its reaper timer is (re)armed.
    pub fn handle_start(
        &self,
        point: &AttachmentPoint,
        mac: MacAddress,
    ) -> Result<Arc<Session>, Dot1xError> {
        let session = self.session_for(point)?;
        session.set_supplicant_address(mac);
        session.set_attachment_point(point.clone());
        session.touch();

        let transition = self.registry.start(&session)?;
        tracing::debug!(
            session_key = %session.key(),
            %mac,
            from = %transition.from,
            "supplicant started authentication"
        );

        self.scheduler.schedule(&session);
        Ok(session)
    }

    /// The supplicant behind `key` sent its identity; a request is about
    /// to go to the authentication server.
    pub fn handle_identity(
        &self,
        key: &SessionKey,
        username: Vec<u8>,
    ) -> Result<Transition, Dot1xError> {
        let session = self.require(key)?;
        session.touch();
        session.set_username(username);

        let transition = self.registry.request_access(&session)?;
        if transition.to == SessionState::Pending {
            session.set_waiting_for_response(true);
        }

        self.scheduler.schedule(&session);
        Ok(transition)
    }

    /// The authentication server answered the request tagged `id`.
    ///
    /// `accepted` selects between `authorize_access` and `deny_access`.
    /// Either way the session's correlation ids are released and its
    /// reaper timer is cancelled.
    pub fn handle_server_response(
        &self,
        id: CorrelationId,
        accepted: bool,
    ) -> Result<Transition, Dot1xError> {
        let Some(session) = self.registry.lookup_by_id(id) else {
            tracing::warn!(%id, "server reply for unknown correlation id");
            return Err(Dot1xError::UnknownCorrelationId(id));
        };
        session.touch();
        session.set_waiting_for_response(false);

        let transition = if accepted {
            self.registry.authorize_access(&session)?
        } else {
            self.registry.deny_access(&session)?
        };
        Ok(transition)
    }

    /// The supplicant behind `key` logged off. The session is moved to
    /// `Idle` and then dropped from the registry.
    pub fn handle_logoff(&self, key: &SessionKey) -> Result<Transition, Dot1xError> {
        let session = self.require(key)?;
        let transition = self.registry.logoff(&session)?;
        self.registry.evict(&session);
        tracing::info!(session_key = %key, "supplicant logged off");
        Ok(transition)
    }

    /// Operator request to forget the supplicant with address `mac`.
    ///
    /// Returns the removed session, or `None` if no session carries that
    /// address. Only the first match is removed.
    pub fn handle_admin_delete(&self, mac: MacAddress) -> Option<Arc<Session>> {
        self.registry.delete_by_address(mac)
    }

    fn session_for(&self, point: &AttachmentPoint) -> Result<Arc<Session>, Dot1xError> {
        let key = SessionKey::from(point);
        if let Some(existing) = self.registry.lookup_by_key(&key) {
            return Ok(existing);
        }
        match self.registry.create(key.clone()) {
            Ok(session) => Ok(session),
            // Lost a race with a concurrent start on the same port.
            Err(SessionError::AlreadyExists(_)) => self
                .registry
                .lookup_by_key(&key)
                .ok_or(Dot1xError::UnknownSession(key)),
            Err(e) => Err(e.into()),
        }
    }

    fn require(&self, key: &SessionKey) -> Result<Arc<Session>, Dot1xError> {
        self.registry
            .lookup_by_key(key)
            .ok_or_else(|| Dot1xError::UnknownSession(key.clone()))
    }
}
