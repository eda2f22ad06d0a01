// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group membership scenarios, replayed on a fresh store each.
use causal_acl::test_utils::{
    TestMember, TestStore, accept_all_store, assert_members, grant, message, revoke, root,
    setup_logging,
};
use causal_acl::{AdmitError, Algorithm, AuthError, Resolution};
use causal_acl_core::{Operation, PowerLevel};

const ALICE: TestMember = TestMember::Alice;
const BOB: TestMember = TestMember::Bob;
const CLAIRE: TestMember = TestMember::Claire;

fn store_with(operations: &[&Operation]) -> TestStore {
    setup_logging();
    let mut store = accept_all_store();
    for operation in operations {
        store.admit((*operation).clone()).unwrap();
    }
    store
}

fn message_bodies(resolution: &Resolution) -> Vec<Vec<u8>> {
    resolution
        .project()
        .messages
        .into_iter()
        .map(|entry| entry.body)
        .collect()
}

#[test]
fn add_and_remove() {
    let r = root(ALICE);
    let add_bob = grant(ALICE, &[r.id()], BOB, PowerLevel::USER);
    let hello = message(BOB, &[add_bob.id()], b"hello");
    let remove_bob = revoke(ALICE, &[hello.id()], BOB);
    let store = store_with(&[&r, &add_bob, &hello, &remove_bob]);

    let resolution = store.resolve(Algorithm::Seniority).unwrap();
    assert!(resolution.rejected.is_empty());
    assert_members(
        &resolution.project().acl,
        &[(ALICE, PowerLevel::ADMINISTRATOR)],
    );
    // Posted while Bob was still a member.
    assert_eq!(
        message_bodies(&resolution),
        vec![b"create".to_vec(), b"hello".to_vec()]
    );
}

#[test]
fn concurrent_removal() {
    let r = root(ALICE);
    let add_bob = grant(ALICE, &[r.id()], BOB, PowerLevel::USER);
    let add_claire = grant(ALICE, &[add_bob.id()], CLAIRE, PowerLevel::USER);
    let by_alice = revoke(ALICE, &[add_claire.id()], CLAIRE);
    let by_bob = revoke(BOB, &[add_claire.id()], CLAIRE);
    let store = store_with(&[&r, &add_bob, &add_claire, &by_alice, &by_bob]);

    let resolution = store.resolve(Algorithm::Seniority).unwrap();
    assert_eq!(resolution.superseded, vec![by_bob.id()]);
    assert_members(
        &resolution.project().acl,
        &[
            (ALICE, PowerLevel::ADMINISTRATOR),
            (BOB, PowerLevel::USER),
        ],
    );
}

#[test]
fn mutual_removal_keeps_senior_member() {
    let r = root(ALICE);
    let add_bob = grant(ALICE, &[r.id()], BOB, PowerLevel::USER);
    let add_claire = grant(ALICE, &[add_bob.id()], CLAIRE, PowerLevel::USER);
    let bob_removes_claire = revoke(BOB, &[add_claire.id()], CLAIRE);
    let claire_removes_bob = revoke(CLAIRE, &[add_claire.id()], BOB);
    let store = store_with(&[
        &r,
        &add_bob,
        &add_claire,
        &bob_removes_claire,
        &claire_removes_bob,
    ]);

    let resolution = store.resolve(Algorithm::Seniority).unwrap();
    assert_eq!(resolution.superseded, vec![claire_removes_bob.id()]);
    assert_members(
        &resolution.project().acl,
        &[
            (ALICE, PowerLevel::ADMINISTRATOR),
            (BOB, PowerLevel::USER),
        ],
    );
}

#[test]
fn remove_then_post() {
    let r = root(ALICE);
    let add_bob = grant(ALICE, &[r.id()], BOB, PowerLevel::USER);
    let remove_bob = revoke(ALICE, &[add_bob.id()], BOB);
    let late = message(BOB, &[remove_bob.id()], b"am I still here?");
    let store = store_with(&[&r, &add_bob, &remove_bob, &late]);

    let resolution = store.resolve(Algorithm::Seniority).unwrap();
    assert_eq!(resolution.rejected.len(), 1);
    assert_eq!(
        resolution.rejected[0].error,
        AuthError::RevokedAuthor {
            author: BOB.public_key(),
            revocation: remove_bob.id(),
        }
    );
    assert_eq!(message_bodies(&resolution), vec![b"create".to_vec()]);

    // A strict store refuses the message right away.
    let mut strict = store_with(&[&r, &add_bob, &remove_bob]);
    assert!(matches!(
        strict.admit_authorized(late.clone(), Algorithm::Seniority),
        Err(AdmitError::Unauthorized(AuthError::RevokedAuthor { .. }))
    ));
    assert!(!strict.contains(&late.id()));
}

#[test]
fn readd_then_post() {
    let r = root(ALICE);
    let add_bob = grant(ALICE, &[r.id()], BOB, PowerLevel::USER);
    let remove_bob = revoke(ALICE, &[add_bob.id()], BOB);
    let readd_bob = grant(ALICE, &[remove_bob.id()], BOB, PowerLevel::USER);
    let back = message(BOB, &[readd_bob.id()], b"back again");
    let store = store_with(&[&r, &add_bob, &remove_bob, &readd_bob, &back]);

    let resolution = store.resolve(Algorithm::Seniority).unwrap();
    assert!(resolution.rejected.is_empty());
    assert!(resolution.superseded.is_empty());
    assert_eq!(
        message_bodies(&resolution),
        vec![b"create".to_vec(), b"back again".to_vec()]
    );
    assert_members(
        &resolution.project().acl,
        &[
            (ALICE, PowerLevel::ADMINISTRATOR),
            (BOB, PowerLevel::USER),
        ],
    );
}

#[test]
fn concurrent_remove_and_post() {
    let r = root(ALICE);
    let add_bob = grant(ALICE, &[r.id()], BOB, PowerLevel::MODERATOR);
    let remove_bob = revoke(ALICE, &[add_bob.id()], BOB);
    let racing = message(BOB, &[add_bob.id()], b"racing");
    let store = store_with(&[&r, &add_bob, &remove_bob, &racing]);

    // The removal wins the race, the message goes with it.
    let resolution = store.resolve(Algorithm::Seniority).unwrap();
    assert_eq!(resolution.superseded, vec![racing.id()]);
    assert_eq!(message_bodies(&resolution), vec![b"create".to_vec()]);

    // Messages never take part in power-level conflicts.
    let resolution = store.resolve(Algorithm::PowerLevel).unwrap();
    assert!(resolution.superseded.is_empty());
    assert_eq!(
        message_bodies(&resolution),
        vec![b"create".to_vec(), b"racing".to_vec()]
    );
    assert_members(
        &resolution.project().acl,
        &[(ALICE, PowerLevel::ADMINISTRATOR)],
    );
}

#[test]
fn authority_at_time_of_writing() {
    // Alice (100) creates the group by making Bob a moderator (50).
    let r = grant(ALICE, &[], BOB, PowerLevel::MODERATOR);
    let escalate = grant(BOB, &[r.id()], CLAIRE, PowerLevel::new(80));
    let by_alice = grant(ALICE, &[r.id()], CLAIRE, PowerLevel::new(80));
    let by_bob = grant(BOB, &[r.id()], CLAIRE, PowerLevel::new(30));
    let store = store_with(&[&r, &escalate, &by_alice, &by_bob]);

    let resolution = store.resolve(Algorithm::PowerLevel).unwrap();
    assert_eq!(resolution.rejected.len(), 1);
    assert_eq!(resolution.rejected[0].id, escalate.id());
    assert_eq!(
        resolution.rejected[0].error,
        AuthError::InsufficientAuthority {
            author: BOB.public_key(),
            level: PowerLevel::MODERATOR,
            required: PowerLevel::new(80),
        }
    );
    assert_eq!(resolution.superseded, vec![by_bob.id()]);
    assert_members(
        &resolution.project().acl,
        &[
            (ALICE, PowerLevel::ADMINISTRATOR),
            (BOB, PowerLevel::MODERATOR),
            (CLAIRE, PowerLevel::new(80)),
        ],
    );

    let mut strict = store_with(&[&r]);
    assert!(matches!(
        strict.admit_authorized(escalate, Algorithm::PowerLevel),
        Err(AdmitError::Unauthorized(AuthError::InsufficientAuthority { .. }))
    ));
    strict
        .admit_authorized(by_bob, Algorithm::PowerLevel)
        .unwrap();
}

#[test]
fn every_replica_picks_the_senior_device() {
    let [d1, d2, d3, d4] = [
        TestMember::Alice,
        TestMember::Bob,
        TestMember::Claire,
        TestMember::Dave,
    ];

    let r = root(d1);
    let add_d2 = grant(d1, &[r.id()], d2, PowerLevel::USER);
    let add_d3 = grant(d1, &[add_d2.id()], d3, PowerLevel::USER);
    let by_d3 = grant(d3, &[add_d3.id()], d4, PowerLevel::new(30));
    let by_d2 = grant(d2, &[add_d3.id()], d4, PowerLevel::new(10));

    let forwards = store_with(&[&r, &add_d2, &add_d3, &by_d2, &by_d3]);
    let backwards = store_with(&[&r, &add_d2, &add_d3, &by_d3, &by_d2]);

    for store in [forwards, backwards] {
        let resolution = store.resolve(Algorithm::Seniority).unwrap();
        assert_eq!(resolution.superseded, vec![by_d3.id()]);
        assert_eq!(
            resolution.project().acl.level(&d4.public_key()),
            Some(PowerLevel::new(10))
        );
    }
}

#[test]
fn removal_after_delegated_add() {
    let r = root(ALICE);
    let add_bob = grant(ALICE, &[r.id()], BOB, PowerLevel::USER);
    let add_claire = grant(BOB, &[add_bob.id()], CLAIRE, PowerLevel::USER);
    let remove_bob = revoke(ALICE, &[add_claire.id()], BOB);
    let store = store_with(&[&r, &add_bob, &add_claire, &remove_bob]);

    // Bob was still a member when he added Claire, so she stays.
    let resolution = store.resolve(Algorithm::Seniority).unwrap();
    assert!(resolution.rejected.is_empty());
    assert!(resolution.superseded.is_empty());
    assert_members(
        &resolution.project().acl,
        &[
            (ALICE, PowerLevel::ADMINISTRATOR),
            (CLAIRE, PowerLevel::USER),
        ],
    );
}

#[test]
fn authority_cycle_is_broken_by_seniority() {
    // Alice removes Bob while Bob adds Claire, who then removes Alice. Each removal undoes the
    // authority the other one is based on.
    let r = root(ALICE);
    let add_bob = grant(ALICE, &[r.id()], BOB, PowerLevel::USER);
    let remove_bob = revoke(ALICE, &[add_bob.id()], BOB);
    let add_claire = grant(BOB, &[add_bob.id()], CLAIRE, PowerLevel::USER);
    let remove_alice = revoke(CLAIRE, &[add_claire.id()], ALICE);
    let store = store_with(&[&r, &add_bob, &remove_bob, &add_claire, &remove_alice]);

    let resolution = store.resolve(Algorithm::Seniority).unwrap();
    assert!(resolution.rejected.is_empty());
    assert_eq!(
        resolution.superseded,
        vec![add_claire.id(), remove_alice.id()]
    );
    assert!(resolution.ids().contains(&remove_bob.id()));
    assert_members(
        &resolution.project().acl,
        &[(ALICE, PowerLevel::ADMINISTRATOR)],
    );
}

#[test]
fn mutual_removal_after_readding_creator() {
    // Bob removes and re-adds Alice before both remove each other. Seniority counts from
    // Alice's first join, so she still outranks Bob.
    let r = root(ALICE);
    let add_bob = grant(ALICE, &[r.id()], BOB, PowerLevel::USER);
    let remove_alice = revoke(BOB, &[add_bob.id()], ALICE);
    let readd_alice = grant(BOB, &[remove_alice.id()], ALICE, PowerLevel::USER);
    let bob_removes_alice = revoke(BOB, &[readd_alice.id()], ALICE);
    let alice_removes_bob = revoke(ALICE, &[readd_alice.id()], BOB);
    let store = store_with(&[
        &r,
        &add_bob,
        &remove_alice,
        &readd_alice,
        &bob_removes_alice,
        &alice_removes_bob,
    ]);

    let resolution = store.resolve(Algorithm::Seniority).unwrap();
    assert!(resolution.rejected.is_empty());
    assert_eq!(resolution.superseded, vec![bob_removes_alice.id()]);
    assert_members(&resolution.project().acl, &[(ALICE, PowerLevel::USER)]);

    let seniority = store.seniority_list().unwrap();
    assert_eq!(seniority.rank(&ALICE.public_key()), Some(0));
    assert!(seniority.is_senior(&ALICE.public_key(), &BOB.public_key()));
}

#[test]
fn readding_does_not_revive_earlier_posts() {
    let r = root(ALICE);
    let add_bob = grant(ALICE, &[r.id()], BOB, PowerLevel::USER);
    let remove_bob = revoke(ALICE, &[add_bob.id()], BOB);
    let post = message(BOB, &[remove_bob.id()], b"while removed");
    let readd_bob = grant(ALICE, &[post.id()], BOB, PowerLevel::USER);
    let store = store_with(&[&r, &add_bob, &remove_bob, &post, &readd_bob]);

    let resolution = store.resolve(Algorithm::Seniority).unwrap();
    assert_eq!(resolution.rejected.len(), 1);
    assert_eq!(resolution.rejected[0].id, post.id());
    assert!(resolution.ids().contains(&readd_bob.id()));
    assert_eq!(message_bodies(&resolution), vec![b"create".to_vec()]);
    assert_members(
        &resolution.project().acl,
        &[
            (ALICE, PowerLevel::ADMINISTRATOR),
            (BOB, PowerLevel::USER),
        ],
    );
}
