// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tests for the process error taxonomy.

use sp_error::{CancelFailureKind, ErrorCategory, ErrorCode, ProcessError};
use std::io;

// ---------------------------------------------------------------------------
// Code mapping
// ---------------------------------------------------------------------------

#[test]
fn invalid_configuration_maps_to_config() {
    let err = ProcessError::invalid("flags length 2 does not match 3 handles");
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
    assert_eq!(err.category(), ErrorCategory::Config);
    assert!(err.to_string().contains("flags length 2"));
    assert_eq!(err.os_code(), None);
}

#[test]
fn foreign_cancellation_maps_to_cancel_foreign() {
    let err = ProcessError::CancelFailure {
        kind: CancelFailureKind::ForeignCancellation,
    };
    assert_eq!(err.code(), ErrorCode::CancelForeign);
    assert_eq!(err.category(), ErrorCategory::Cancel);
}

#[test]
fn abandon_failed_carries_os_code() {
    let err = ProcessError::CancelFailure {
        kind: CancelFailureKind::AbandonFailed { code: 6 },
    };
    assert_eq!(err.code(), ErrorCode::CancelAbandonFailed);
    assert_eq!(err.os_code(), Some(6));
}

#[test]
fn io_error_converts_with_question_mark() {
    fn fails() -> sp_error::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert_eq!(err.code(), ErrorCode::StreamIo);
    assert_eq!(err.category(), ErrorCategory::Io);
}

#[test]
fn last_os_error_records_operation() {
    let err = ProcessError::last_os_error("CreatePipe");
    match err {
        ProcessError::OsResource { operation, .. } => assert_eq!(operation, "CreatePipe"),
        other => panic!("expected OsResource, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Serde
// ---------------------------------------------------------------------------

#[test]
fn cancel_failure_kind_serializes_tagged() {
    let json = serde_json::to_value(CancelFailureKind::AbandonFailed { code: 5 }).unwrap();
    assert_eq!(json["kind"], "abandon_failed");
    assert_eq!(json["code"], 5);
}

#[test]
fn category_display_is_snake_case() {
    assert_eq!(ErrorCategory::Os.to_string(), "os");
    assert_eq!(ErrorCode::OsResource.to_string(), "OS_RESOURCE");
}
