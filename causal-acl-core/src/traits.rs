// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capabilities injected into the engine by the surrounding application.
use crate::operation::Operation;

/// Decides if the signature of an operation is acceptable.
///
/// Key distribution and trust are outside of the access-control engine, it only asks this
/// interface before admitting an operation.
pub trait Verifier {
    fn verify(&self, operation: &Operation) -> bool;
}

/// Verifies the Ed25519 signature of the operation against its author's public key.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl Verifier for Ed25519Verifier {
    fn verify(&self, operation: &Operation) -> bool {
        operation.verify_signature()
    }
}

impl<F> Verifier for F
where
    F: Fn(&Operation) -> bool,
{
    fn verify(&self, operation: &Operation) -> bool {
        self(operation)
    }
}
