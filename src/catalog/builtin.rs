//! Built-in `tcp` function records

use std::collections::BTreeMap;

use super::types::{ArgSpec, FunctionRecord, ResultSpec};

const TOPIC: &str = "tcp";

fn handle_arg() -> ArgSpec {
    ArgSpec {
        name: "s".to_string(),
        ty: "int".to_string(),
        info: "The TCP connection handle.".to_string(),
    }
}

fn int_result() -> ResultSpec {
    ResultSpec {
        ty: "int".to_string(),
        success: "0".to_string(),
        error: "-1".to_string(),
    }
}

pub fn tcp_attach() -> FunctionRecord {
    FunctionRecord {
        name: "tcp_attach".to_string(),
        topic: TOPIC.to_string(),
        info: "creates a TCP connection handle from an established stream".to_string(),
        result: Some(ResultSpec {
            ty: "int".to_string(),
            success: "newly created connection handle".to_string(),
            error: "-1".to_string(),
        }),
        args: vec![ArgSpec {
            name: "stream".to_string(),
            ty: "TcpStream".to_string(),
            info: "Connected TCP stream. The handle takes ownership of it.".to_string(),
        }],
        has_deadline: false,
        prologue: "
            This function wraps an already connected TCP stream into a
            connection handle. The stream can be retrieved back using
            **tcp_detach**.
        "
        .to_string(),
        has_handle_argument: false,
        custom_errors: BTreeMap::from([(
            "EMFILE".to_string(),
            "Maximum number of connection handles reached.".to_string(),
        )]),
    }
}

pub fn tcp_done() -> FunctionRecord {
    FunctionRecord {
        name: "tcp_done".to_string(),
        topic: TOPIC.to_string(),
        info: "half-closes a TCP connection".to_string(),
        result: Some(int_result()),
        args: vec![handle_arg()],
        has_deadline: true,
        prologue: "
            This function closes the outbound half of TCP connection.
            Technically, it sends a FIN packet to the peer. This will, in turn,
            cause the peer to get **EPIPE** error after it has received all
            the data.
        "
        .to_string(),
        has_handle_argument: true,
        custom_errors: BTreeMap::from([(
            "EPIPE".to_string(),
            "The connection was already half-closed.".to_string(),
        )]),
    }
}

pub fn tcp_close() -> FunctionRecord {
    FunctionRecord {
        name: "tcp_close".to_string(),
        topic: TOPIC.to_string(),
        info: "closes TCP connection in an orderly manner".to_string(),
        result: Some(int_result()),
        args: vec![handle_arg()],
        has_deadline: true,
        prologue: "
            This function closes a TCP connection cleanly. It sends a FIN
            packet to the peer, unless **tcp_done** already did, and waits
            till the peer shuts down its own half. If this terminal handshake
            cannot be done before the deadline it returns error. The handle
            is closed anyway. Inbound data that arrives before the peer's
            FIN is discarded.
        "
        .to_string(),
        has_handle_argument: true,
        custom_errors: BTreeMap::new(),
    }
}

pub fn tcp_detach() -> FunctionRecord {
    FunctionRecord {
        name: "tcp_detach".to_string(),
        topic: TOPIC.to_string(),
        info: "terminates TCP protocol and returns the underlying stream".to_string(),
        result: Some(ResultSpec {
            ty: "TcpStream".to_string(),
            success: "the underlying stream".to_string(),
            error: "none".to_string(),
        }),
        args: vec![handle_arg()],
        has_deadline: false,
        prologue: "
            This function releases the connection handle and returns the
            underlying stream without closing it, so the stream can be used
            directly or attached again.
        "
        .to_string(),
        has_handle_argument: true,
        custom_errors: BTreeMap::from([(
            "EIO".to_string(),
            "The stream is still in use by another operation.".to_string(),
        )]),
    }
}

/// Every built-in record, in registration order
pub fn all() -> Vec<FunctionRecord> {
    vec![tcp_attach(), tcp_done(), tcp_close(), tcp_detach()]
}
