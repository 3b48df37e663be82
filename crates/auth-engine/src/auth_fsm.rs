//! Authentication state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                    ┌──────────┐  SubmitRefresh   ┌─────────────┐
//!          ┌────────►│   Idle   │─────────────────►│ Refreshing  │◄─┐ SecretRotated
//!          │         └────┬─────┘                  └──────┬──────┘──┘
//!          │ Rejected     │ SubmitPassword                │ TokenIssued / Rejected
//!          │              ▼                               ▼
//!          │   ┌────────────────────┐  TokenIssued  ┌───────────────┐
//!          └───│ PasswordSubmitted  │──────────────►│ Authenticated │
//!              └─────────┬──────────┘               └───────────────┘
//!                        │ ChallengeIssued                  ▲
//!                        ▼                                  │ TokenIssued
//!              ┌────────────────────┐  SubmitOtp  ┌─────────┴─────────┐
//!              │     MfaPending     │────────────►│  ResumeSubmitted  │
//!              └────────────────────┘             └─────────┬─────────┘
//!                                                           │ Rejected
//!                                                           ▼
//!                                                     ┌───────────┐
//!                                                     │ MfaFailed │
//!                                                     └───────────┘
//! ```
//!
//! A fresh process starts in `Idle` even when a challenge is persisted, so
//! `Idle` also accepts `SubmitOtp`. `SecretRotated` is the self-loop taken
//! while the client secret is refetched after an `invalid_client` rejection.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Idle)

    Idle => {
        SubmitPassword => PasswordSubmitted,
        SubmitOtp => ResumeSubmitted,
        SubmitRefresh => Refreshing
    },
    PasswordSubmitted => {
        TokenIssued => Authenticated,
        ChallengeIssued => MfaPending,
        Rejected => Idle,
        SecretRotated => PasswordSubmitted
    },
    MfaPending => {
        SubmitOtp => ResumeSubmitted,
        SubmitPassword => PasswordSubmitted
    },
    ResumeSubmitted => {
        TokenIssued => Authenticated,
        // Server may answer a resume with a fresh challenge
        ChallengeIssued => MfaPending,
        Rejected => MfaFailed,
        SecretRotated => ResumeSubmitted
    },
    MfaFailed => {
        SubmitPassword => PasswordSubmitted
    },
    Authenticated => {
        SubmitRefresh => Refreshing,
        SubmitPassword => PasswordSubmitted
    },
    Refreshing => {
        TokenIssued => Authenticated,
        Rejected => Idle,
        SecretRotated => Refreshing
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// User-facing view of the FSM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Idle,
    PasswordSubmitted,
    MfaPending,
    ResumeSubmitted,
    MfaFailed,
    Authenticated,
    Refreshing,
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::Idle => AuthState::Idle,
            AuthMachineState::PasswordSubmitted => AuthState::PasswordSubmitted,
            AuthMachineState::MfaPending => AuthState::MfaPending,
            AuthMachineState::ResumeSubmitted => AuthState::ResumeSubmitted,
            AuthMachineState::MfaFailed => AuthState::MfaFailed,
            AuthMachineState::Authenticated => AuthState::Authenticated,
            AuthMachineState::Refreshing => AuthState::Refreshing,
        }
    }
}
