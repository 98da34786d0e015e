//! Error classification.
//!
//! Turns local transport failures and the remote's string error identifiers
//! into [`RemoteError`] values. The identifier tables mirror the vocabulary
//! of the streaming application and must stay byte-for-byte identical to it.

use streamctl_types::{ConnectionError, ErrorCategory, RemoteError, StartError, StopError};

/// Start-request failure identifiers sent by the remote.
const START_ERRORS: &[(&str, StartError, &str)] = &[
    ("kNoUser", StartError::NoUser, "no user is logged in"),
    (
        "kNotStandbySelf",
        StartError::NotStandbySelf,
        "streaming is already on air from this title",
    ),
    (
        "kNotStandbyOther",
        StartError::NotStandbyOther,
        "streaming is already on air from another title",
    ),
    (
        "kUnknownTitle",
        StartError::UnknownTitle,
        "the title is not known to the streaming application",
    ),
    (
        "kMePageSelectEmpty",
        StartError::MePageSelectEmpty,
        "no personal page is selected",
    ),
    (
        "kPrivacySelectEmpty",
        StartError::PrivacySelectEmpty,
        "no privacy option is selected",
    ),
    (
        "kOwnPageSelectEmpty",
        StartError::OwnPageSelectEmpty,
        "no owned page is selected",
    ),
    (
        "kObsInternal",
        StartError::ObsInternal,
        "the streaming engine failed internally",
    ),
    (
        "kStreamingServiceFacebookLive",
        StartError::StreamingServiceFacebookLive,
        "the streaming service (Facebook Live) rejected the stream",
    ),
];

/// Stop-request failure identifiers sent by the remote.
const STOP_ERRORS: &[(&str, StopError, &str)] = &[
    ("kNotOnAir", StopError::NotOnAir, "streaming is not on air"),
    (
        "kTitleMismatch",
        StopError::TitleMismatch,
        "the title does not match the streaming source",
    ),
];

/// Fixed description of a local or transport failure.
#[must_use]
pub fn connection_description(code: ConnectionError) -> &'static str {
    match code {
        ConnectionError::NoTargetProcess => "the streaming application is not running",
        ConnectionError::TransportInit => "failed to initialize the transport",
        ConnectionError::Connect => "failed to connect to the streaming application",
        ConnectionError::Send => "failed to send the request",
        ConnectionError::RemoteClose => "the connection was closed by the remote",
        ConnectionError::RemoteFail => "the connection to the remote failed",
        ConnectionError::Busy => "another request is in progress",
    }
}

/// Classify a local failure.
#[must_use]
pub fn connection_error(code: ConnectionError) -> RemoteError {
    RemoteError::new(
        ErrorCategory::Connection,
        code.code(),
        connection_description(code),
    )
}

/// Classify a local failure, appending the low-level detail.
#[must_use]
pub fn connection_error_with_detail(code: ConnectionError, detail: &str) -> RemoteError {
    RemoteError::new(
        ErrorCategory::Connection,
        code.code(),
        format!("{}: {detail}", connection_description(code)),
    )
}

/// Look up a start failure identifier. Unknown identifiers map to
/// [`StartError::Unknown`].
#[must_use]
pub fn start_error(identifier: &str) -> (StartError, String) {
    START_ERRORS
        .iter()
        .find(|(id, _, _)| *id == identifier)
        .map_or_else(
            || {
                (
                    StartError::Unknown,
                    format!("unknown start error: {identifier}"),
                )
            },
            |(_, code, description)| (*code, (*description).to_string()),
        )
}

/// Look up a stop failure identifier. Unknown identifiers map to
/// [`StopError::Unknown`].
#[must_use]
pub fn stop_error(identifier: &str) -> (StopError, String) {
    STOP_ERRORS
        .iter()
        .find(|(id, _, _)| *id == identifier)
        .map_or_else(
            || {
                (
                    StopError::Unknown,
                    format!("unknown stop error: {identifier}"),
                )
            },
            |(_, code, description)| (*code, (*description).to_string()),
        )
}

#[must_use]
pub fn classify_start_error(identifier: &str) -> RemoteError {
    let (code, description) = start_error(identifier);
    RemoteError::new(ErrorCategory::Start, code.code(), description)
}

#[must_use]
pub fn classify_stop_error(identifier: &str) -> RemoteError {
    let (code, description) = stop_error(identifier);
    RemoteError::new(ErrorCategory::Stop, code.code(), description)
}

/// Remote failures with no dedicated table keep the identifier as text.
#[must_use]
pub fn classify_misc_error(identifier: &str) -> RemoteError {
    RemoteError::new(ErrorCategory::Misc, 0, identifier)
}
