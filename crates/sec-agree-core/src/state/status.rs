//! IPsec association-status tracking (ETSI ES 283.003)
//!
//! Only agreements working on a Gm interface track the status. Activation of
//! an IPsec channel opens a temporary association; the first 200 response
//! that crosses the agreement afterwards makes it established.

use serde::{Deserialize, Serialize};

use crate::errors::{SecAgreeError, SecAgreeResult};
use crate::types::{AssociationStatus, MechanismType, Role, SecAgreeState, SecAgreeStatus};

const RESPONSE_OK: u16 = 200;

/// What may move the association status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusTrigger {
    /// The secure channel was activated for ipsec-3gpp
    IpsecActivation,
    /// A response with this code was received
    ResponseReceived(u16),
    /// A response with this code is about to be sent
    ResponseToSend(u16),
}

/// Agreement facts the tracker looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusContext {
    pub role: Role,
    pub state: SecAgreeState,
    pub gm_interface: bool,
    pub selected: Option<MechanismType>,
}

/// Compute the association status that `trigger` leads to
///
/// Returns `Ok(None)` when the status does not change.
pub fn consider_new_status(
    current: AssociationStatus,
    trigger: StatusTrigger,
    ctx: &StatusContext,
) -> SecAgreeResult<Option<AssociationStatus>> {
    if !ctx.gm_interface {
        return Ok(None);
    }

    match trigger {
        StatusTrigger::IpsecActivation => {
            if current != AssociationStatus::Undefined {
                return Err(SecAgreeError::illegal_action(format!(
                    "temporary association opened while status is {:?}",
                    current
                )));
            }
            Ok(Some(AssociationStatus::Temporary))
        }
        StatusTrigger::ResponseReceived(code) => {
            let promote = code == RESPONSE_OK
                && ctx.state == SecAgreeState::Active
                && ctx.role == Role::Client
                && current == AssociationStatus::Temporary;
            Ok(promote.then_some(AssociationStatus::Established))
        }
        StatusTrigger::ResponseToSend(code) => {
            let promote = code == RESPONSE_OK
                && ctx.state == SecAgreeState::Active
                && ctx.role == Role::Server
                && ctx.selected == Some(MechanismType::Ipsec3gpp)
                && current == AssociationStatus::Temporary;
            Ok(promote.then_some(AssociationStatus::Established))
        }
    }
}

/// Notification reported for a newly entered status
pub fn status_notification(status: AssociationStatus) -> Option<SecAgreeStatus> {
    match status {
        AssociationStatus::Temporary => Some(SecAgreeStatus::IpsecTemporaryAssociation),
        AssociationStatus::Established => Some(SecAgreeStatus::IpsecEstablishedAssociation),
        AssociationStatus::Undefined => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_active() -> StatusContext {
        StatusContext {
            role: Role::Client,
            state: SecAgreeState::Active,
            gm_interface: true,
            selected: Some(MechanismType::Ipsec3gpp),
        }
    }

    #[test]
    fn test_activation_then_200_establishes() {
        let ctx = client_active();
        let status = consider_new_status(AssociationStatus::Undefined, StatusTrigger::IpsecActivation, &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(status, AssociationStatus::Temporary);

        let status = consider_new_status(status, StatusTrigger::ResponseReceived(200), &ctx).unwrap();
        assert_eq!(status, Some(AssociationStatus::Established));
    }

    #[test]
    fn test_second_activation_is_rejected() {
        let err = consider_new_status(
            AssociationStatus::Temporary,
            StatusTrigger::IpsecActivation,
            &client_active(),
        )
        .unwrap_err();
        assert!(matches!(err, SecAgreeError::IllegalAction { .. }));
    }

    #[test]
    fn test_non_gm_agreements_are_not_tracked() {
        let ctx = StatusContext { gm_interface: false, ..client_active() };
        assert_eq!(
            consider_new_status(AssociationStatus::Temporary, StatusTrigger::IpsecActivation, &ctx),
            Ok(None)
        );
    }

    #[test]
    fn test_server_promotes_only_for_ipsec() {
        let ctx = StatusContext { role: Role::Server, ..client_active() };
        assert_eq!(
            consider_new_status(AssociationStatus::Temporary, StatusTrigger::ResponseToSend(200), &ctx),
            Ok(Some(AssociationStatus::Established))
        );
        // servers ignore received responses
        assert_eq!(
            consider_new_status(AssociationStatus::Temporary, StatusTrigger::ResponseReceived(200), &ctx),
            Ok(None)
        );

        let ctx = StatusContext { selected: Some(MechanismType::Digest), ..ctx };
        assert_eq!(
            consider_new_status(AssociationStatus::Temporary, StatusTrigger::ResponseToSend(200), &ctx),
            Ok(None)
        );
    }

    #[test]
    fn test_only_200_promotes() {
        assert_eq!(
            consider_new_status(
                AssociationStatus::Temporary,
                StatusTrigger::ResponseReceived(180),
                &client_active()
            ),
            Ok(None)
        );
    }
}
