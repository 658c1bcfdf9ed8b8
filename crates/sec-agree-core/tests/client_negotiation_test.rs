//! Client-side negotiation tests
//!
//! Drives client agreements through the Security-Client / Security-Server /
//! Security-Verify exchange the way a registration client would.

mod common;

use common::*;
use rvoip_sec_agree_core::prelude::*;

fn negotiation_only() -> SecAgreeConfig {
    SecAgreeConfig::default().with_ipsec_negotiation_only().without_tls()
}

/// Initial request on a plain transport goes through ClientHandlingInitialMsg
#[test]
fn test_initial_request_without_channel() -> Result<(), SecAgreeError> {
    let harness = Harness::new(negotiation_only());
    let (_, agreement) = harness.agreement(Role::Client);

    agreement.push_local_header(client_ipsec())?;
    agreement.init()?;
    assert_eq!(agreement.state()?, SecAgreeState::ClientLocalListReady);
    assert!(agreement.secure_channel()?.is_none());

    let mut register = OutboundMessage::request("REGISTER", 1);
    agreement.client_message_to_send(&mut register)?;
    assert_eq!(agreement.state()?, SecAgreeState::ClientHandlingInitialMsg);
    assert_eq!(register.security.security_client, agreement.local_list()?);
    assert!(register.security.require_sec_agree);
    assert!(register.security.proxy_require_sec_agree);

    agreement.client_dest_resolved(&mut register, TransportType::Udp, server_addr())?;
    assert_eq!(agreement.state()?, SecAgreeState::ClientLocalListSent);
    assert_eq!(agreement.endpoints()?.remote_ipsec, Some(server_addr()));
    assert_eq!(harness.factory.built(), 0);

    Ok(())
}

/// A TLS destination ends the negotiation and strips the inserted headers
#[test]
fn test_tls_destination_needs_no_agreement() -> Result<(), SecAgreeError> {
    let harness = Harness::new(negotiation_only());
    let (_, agreement) = harness.agreement(Role::Client);

    agreement.push_local_header(SecurityHeader::digest())?;
    agreement.init()?;

    let mut invite = OutboundMessage::request("INVITE", 7);
    agreement.client_message_to_send(&mut invite)?;
    assert!(!invite.security.is_empty());

    agreement.client_dest_resolved(&mut invite, TransportType::Tls, server_addr())?;
    assert_eq!(agreement.state()?, SecAgreeState::NoAgreementRequired);
    assert!(invite.security.is_empty());
    assert_eq!(agreement.endpoints()?.remote_tls, Some(server_addr()));

    Ok(())
}

/// Digest cannot be chosen before the server sent a challenge
#[test]
fn test_digest_requires_a_challenge() -> Result<(), SecAgreeError> {
    let harness = Harness::new(negotiation_only());
    let (_, agreement) = harness.agreement(Role::Client);

    agreement.push_local_header(SecurityHeader::digest())?;
    agreement.init()?;
    let mut register = OutboundMessage::request("REGISTER", 1);
    agreement.client_message_to_send(&mut register)?;
    agreement.client_dest_resolved(&mut register, TransportType::Udp, server_addr())?;

    // 494 without Proxy-Authenticate
    let response = InboundMessage::response("REGISTER", 494, 1)
        .with_security_server(vec![SecurityHeader::digest()]);
    agreement.client_message_received(&response, false)?;
    assert_eq!(agreement.state()?, SecAgreeState::ClientChooseSecurity);

    assert_eq!(agreement.client_get_chosen_security()?, None);
    let err = agreement.client_set_chosen_security(Some(MechanismType::Digest)).unwrap_err();
    assert!(matches!(err, SecAgreeError::IllegalAction { .. }));
    assert_eq!(agreement.state()?, SecAgreeState::ClientChooseSecurity);

    Ok(())
}

/// Digest negotiation from offer to Security-Verify
#[test]
fn test_digest_negotiation_reaches_active() -> Result<(), SecAgreeError> {
    let harness = Harness::new(negotiation_only());
    let (handle, agreement) = harness.agreement(Role::Client);

    agreement.push_local_header(SecurityHeader::digest())?;
    agreement.init()?;
    let mut register = OutboundMessage::request("REGISTER", 1);
    agreement.client_message_to_send(&mut register)?;
    agreement.client_dest_resolved(&mut register, TransportType::Udp, server_addr())?;

    let server_list = vec![SecurityHeader::digest().with_digest_verify("0123456789abcdef")];
    let response = InboundMessage::response("REGISTER", 494, 1)
        .with_security_server(server_list.clone())
        .with_challenge(challenge());
    agreement.client_message_received(&response, false)?;

    let chosen = agreement.client_set_chosen_security(None)?;
    assert_eq!(chosen.mechanism, MechanismType::Digest);
    assert_eq!(agreement.state()?, SecAgreeState::Active);

    let mut second = OutboundMessage::request("REGISTER", 2);
    agreement.client_message_to_send(&mut second)?;
    assert_eq!(second.security.security_verify, server_list);
    assert_eq!(second.security.authorization_challenges, vec![challenge()]);
    assert!(second.security.security_client.is_empty());

    harness.manager.dispatch_pending();
    let states: Vec<_> = harness.handler.states_of(handle).into_iter().map(|(s, _)| s).collect();
    assert_eq!(
        states,
        vec![
            SecAgreeState::ClientLocalListReady,
            SecAgreeState::ClientHandlingInitialMsg,
            SecAgreeState::ClientLocalListSent,
            SecAgreeState::ClientChooseSecurity,
            SecAgreeState::Active,
        ]
    );

    Ok(())
}

/// A final response without Security-Server invalidates the agreement
#[test]
fn test_missing_server_list_invalidates() -> Result<(), SecAgreeError> {
    let harness = Harness::new(negotiation_only());
    let (handle, agreement) = harness.agreement(Role::Client);

    agreement.push_local_header(SecurityHeader::digest())?;
    agreement.init()?;
    let mut register = OutboundMessage::request("REGISTER", 3);
    agreement.client_message_to_send(&mut register)?;
    agreement.client_dest_resolved(&mut register, TransportType::Udp, server_addr())?;

    agreement.client_message_received(&InboundMessage::response("REGISTER", 200, 3), false)?;
    assert_eq!(agreement.state()?, SecAgreeState::Invalid);

    harness.manager.dispatch_pending();
    assert_eq!(
        harness.handler.states_of(handle).last(),
        Some(&(SecAgreeState::Invalid, Reason::ResponseMissing))
    );

    Ok(())
}

/// Responses of other transactions leave a waiting client alone
#[test]
fn test_unrelated_response_is_ignored() -> Result<(), SecAgreeError> {
    let harness = Harness::new(negotiation_only());
    let (_, agreement) = harness.agreement(Role::Client);

    agreement.push_local_header(SecurityHeader::digest())?;
    agreement.init()?;
    let mut register = OutboundMessage::request("REGISTER", 3);
    agreement.client_message_to_send(&mut register)?;
    agreement.client_dest_resolved(&mut register, TransportType::Udp, server_addr())?;

    agreement.client_message_received(&InboundMessage::response("OPTIONS", 200, 9), false)?;
    assert_eq!(agreement.state()?, SecAgreeState::ClientLocalListSent);

    Ok(())
}

/// Full ipsec-3gpp negotiation on the Gm interface
///
/// The channel is built on Init, activated once the mechanism is chosen and
/// the temporary association becomes established on the 200 to the
/// protected REGISTER.
#[test]
fn test_ipsec_negotiation_with_channel() -> Result<(), SecAgreeError> {
    let harness = Harness::new(SecAgreeConfig::default().without_tls());
    let (handle, agreement) = harness.agreement(Role::Client);
    let owner = TestOwner::new(OwnerKind::RegClient);
    agreement.attach_owner(&as_owner(&owner))?;

    agreement.set_special_standard(SpecialStandard::ThreeGpp24229)?;
    agreement.set_local_endpoints(Some(CLIENT_IP), None)?;
    agreement.push_local_header(client_ipsec())?;
    agreement.push_local_header(SecurityHeader::digest())?;
    agreement.init()?;

    let channel = harness.factory.last().expect("channel built on init");
    assert!(channel.called("initiate"));
    let offered = agreement.local_list()?;
    assert_eq!(offered[0].spi_c, channel.allocated().spi_c);
    assert_eq!(offered[0].port_s, channel.allocated().port_s);

    // With a channel the first request goes straight to ClientLocalListSent
    let mut register = OutboundMessage::request("REGISTER", 1);
    agreement.client_message_to_send(&mut register)?;
    assert_eq!(agreement.state()?, SecAgreeState::ClientLocalListSent);
    assert_eq!(register.security.security_client, offered);

    let server_list = vec![
        server_ipsec(QValue::new(0, 500)),
        SecurityHeader::digest().with_preference(QValue::new(0, 100)),
    ];
    let response = InboundMessage::response("REGISTER", 401, 1)
        .with_security_server(server_list.clone())
        .with_challenge(challenge());
    agreement.client_message_received(&response, false)?;
    assert_eq!(agreement.state()?, SecAgreeState::ClientChooseSecurity);

    let proposed = agreement.client_get_chosen_security()?.expect("automatic choice");
    assert_eq!(proposed.mechanism, MechanismType::Ipsec3gpp);

    // Addresses are still missing
    assert!(agreement.client_set_chosen_security(None).is_err());

    agreement.set_remote_endpoints(Some((server_addr(), TransportType::Udp)), None)?;
    agreement.set_ipsec_info(ipsec_keys())?;
    let chosen = agreement.client_set_chosen_security(None)?;
    assert_eq!(chosen.mechanism, MechanismType::Ipsec3gpp);
    assert_eq!(agreement.state()?, SecAgreeState::Active);
    assert_eq!(agreement.association_status()?, AssociationStatus::Temporary);

    assert_eq!(channel.state(), ChannelState::Active);
    assert_eq!(*channel.mechanism.lock(), Some(MechanismType::Ipsec3gpp));
    let remote = channel.remote_ipsec.lock().clone().expect("remote params");
    assert_eq!(remote.peer.spi_c, Some(9001));
    assert_eq!(remote.remote, Some(server_addr()));
    assert_eq!(remote.ik, vec![0x11; 16]);

    // Keys are frozen once active
    assert!(agreement.set_ipsec_info(ipsec_keys()).is_err());

    // The protected REGISTER repeats Security-Client once and carries Security-Verify
    let mut protected = OutboundMessage::request("REGISTER", 2);
    agreement.client_message_to_send(&mut protected)?;
    assert_eq!(protected.security.security_client, offered);
    assert_eq!(protected.security.security_verify, server_list);
    assert!(protected.security.authorization_challenges.is_empty());

    let mut refresh = OutboundMessage::request("REGISTER", 3);
    agreement.client_message_to_send(&mut refresh)?;
    assert!(refresh.security.security_client.is_empty());
    assert_eq!(refresh.security.security_verify, server_list);

    agreement.client_message_received(&InboundMessage::response("REGISTER", 200, 3), false)?;
    assert_eq!(agreement.association_status()?, AssociationStatus::Established);

    harness.manager.dispatch_pending();
    assert_eq!(
        harness.handler.statuses_of(handle),
        vec![
            SecAgreeStatus::IpsecTemporaryAssociation,
            SecAgreeStatus::IpsecEstablishedAssociation,
        ]
    );
    let notes = owner.notes();
    assert!(notes.contains(&OwnerNote::ChannelAttached(channel.id())));
    assert!(notes.contains(&OwnerNote::State(SecAgreeState::Active, Reason::Undefined)));

    Ok(())
}

/// Choosing digest over an ipsec-capable channel tears the channel down
#[test]
fn test_digest_choice_drops_channel() -> Result<(), SecAgreeError> {
    let harness = Harness::new(SecAgreeConfig::default().without_tls());
    let (_, agreement) = harness.agreement(Role::Client);

    agreement.set_local_endpoints(Some(CLIENT_IP), None)?;
    agreement.push_local_header(client_ipsec())?;
    agreement.push_local_header(SecurityHeader::digest())?;
    agreement.init()?;
    let channel = harness.factory.last().expect("channel built on init");

    let mut register = OutboundMessage::request("REGISTER", 1);
    agreement.client_message_to_send(&mut register)?;
    let response = InboundMessage::response("REGISTER", 494, 1)
        .with_security_server(vec![server_ipsec(QValue::new(0, 100)), SecurityHeader::digest()])
        .with_challenge(challenge());
    agreement.client_message_received(&response, false)?;

    let chosen = agreement.client_set_chosen_security(Some(MechanismType::Digest))?;
    assert_eq!(chosen.mechanism, MechanismType::Digest);
    assert_eq!(agreement.state()?, SecAgreeState::Active);
    assert!(agreement.secure_channel()?.is_none());
    assert_eq!(channel.state(), ChannelState::Terminated);

    Ok(())
}

/// A failed activation leaves the agreement choosing
#[test]
fn test_activation_failure_keeps_choice_open() -> Result<(), SecAgreeError> {
    let harness = Harness::new(SecAgreeConfig::default().without_tls());
    harness.factory.fail_activate.store(true, std::sync::atomic::Ordering::SeqCst);
    let (_, agreement) = harness.agreement(Role::Client);

    agreement.set_local_endpoints(Some(CLIENT_IP), None)?;
    agreement.set_remote_endpoints(Some((server_addr(), TransportType::Udp)), None)?;
    agreement.push_local_header(client_ipsec())?;
    agreement.init()?;

    let mut register = OutboundMessage::request("REGISTER", 1);
    agreement.client_message_to_send(&mut register)?;
    let response = InboundMessage::response("REGISTER", 494, 1)
        .with_security_server(vec![server_ipsec(QValue::new(0, 100))]);
    agreement.client_message_received(&response, false)?;

    let err = agreement.client_set_chosen_security(Some(MechanismType::Ipsec3gpp)).unwrap_err();
    assert!(matches!(err, SecAgreeError::Channel(_)));
    assert_eq!(agreement.state()?, SecAgreeState::ClientChooseSecurity);
    assert_eq!(agreement.client_get_chosen_security()?.map(|s| s.mechanism), Some(MechanismType::Ipsec3gpp));

    Ok(())
}

/// Security-Client can be forced into a request of an Active agreement
#[test]
fn test_forced_security_client() -> Result<(), SecAgreeError> {
    let harness = Harness::new(negotiation_only());
    let (_, agreement) = harness.agreement(Role::Client);

    agreement.push_local_header(SecurityHeader::digest())?;
    agreement.init()?;
    let mut register = OutboundMessage::request("REGISTER", 1);
    agreement.client_message_to_send(&mut register)?;
    agreement.client_dest_resolved(&mut register, TransportType::Udp, server_addr())?;
    let response = InboundMessage::response("REGISTER", 494, 1)
        .with_security_server(vec![SecurityHeader::digest()])
        .with_challenge(challenge());
    agreement.client_message_received(&response, false)?;
    agreement.client_set_chosen_security(None)?;

    let mut plain = OutboundMessage::request("REGISTER", 2);
    agreement.client_message_to_send(&mut plain)?;
    assert!(plain.security.security_client.is_empty());

    agreement.client_set_add_security_client(true)?;
    assert!(agreement.client_add_security_client()?);

    let mut refresh = OutboundMessage::request("REGISTER", 3);
    agreement.client_message_to_send(&mut refresh)?;
    assert_eq!(refresh.security.security_client, vec![SecurityHeader::digest()]);

    Ok(())
}

/// ACK never carries agreement headers
#[test]
fn test_ack_is_left_untouched() -> Result<(), SecAgreeError> {
    let harness = Harness::new(negotiation_only());
    let (_, agreement) = harness.agreement(Role::Client);

    agreement.push_local_header(SecurityHeader::digest())?;
    agreement.init()?;

    let mut ack = OutboundMessage::request("ACK", 1);
    agreement.client_message_to_send(&mut ack)?;
    assert!(ack.security.is_empty());
    assert_eq!(agreement.state()?, SecAgreeState::ClientLocalListReady);

    Ok(())
}

/// Server agreements reject client operations
#[test]
fn test_client_operations_need_client_role() -> Result<(), SecAgreeError> {
    let harness = Harness::new(negotiation_only());
    let (_, agreement) = harness.agreement(Role::Server);

    let err = agreement.client_get_chosen_security().unwrap_err();
    assert!(matches!(err, SecAgreeError::IllegalAction { .. }));
    assert!(agreement.client_set_add_security_client(true).is_err());

    Ok(())
}
