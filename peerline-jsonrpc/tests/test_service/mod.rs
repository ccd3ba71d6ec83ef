//! The "test service" shared by the integration and compatibility tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use peerline_jsonrpc::{
    Connection, Dispatcher, ErrorDetails, HandlerError, JsonRpcError, JsonValue, PeerBuilder, Transport, WeakPeer,
    shape,
};
use serde::{Deserialize, Serialize};

/// State behind the "test service".  Its behavior matches the expectations in the `testdata/`
/// folder, so it can be used to exercise the JSON RPC implementation end-to-end.
#[derive(Debug, Default)]
pub struct TestState {
    pub counter: i32,
    pub values: HashMap<String, JsonValue>,
    pub last_notification: Option<String>,
}

pub type SharedState = Arc<Mutex<TestState>>;

/// The peer the test service is attached to, filled in once the peer exists.  Lets handlers call
/// back to whoever called them.
pub type PeerSlot = Arc<OnceLock<WeakPeer>>;

/// Bind a peer running the test service to `transport`.
pub fn bind_test_service(builder: PeerBuilder, transport: impl Transport) -> (Connection, SharedState) {
    let state = SharedState::default();
    let slot = PeerSlot::default();
    let connection = builder
        .with_dispatcher(test_service_dispatcher(state.clone(), slot.clone()))
        .bind(transport);
    slot.set(connection.peer().downgrade()).unwrap();

    (connection, state)
}

/// Create a dispatcher with the methods and notification handlers that make up the "test
/// service".
pub fn test_service_dispatcher(state: SharedState, peer: PeerSlot) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();

    dispatcher
        .register_request_handler("echo", shape::raw(), |params| async move {
            Ok(params.unwrap_or(JsonValue::Null))
        })
        .unwrap();

    // Two overloads for positional and named params
    dispatcher
        .register_request_handler(
            "concat",
            shape::typed::<(i64, String)>(),
            |(number, text)| async move { Ok(format!("{number} {text}")) },
        )
        .unwrap();
    dispatcher
        .register_request_handler("concat", shape::typed::<ConcatParams>(), |params| async move {
            Ok(format!("{} {}", params.number, params.text))
        })
        .unwrap();

    // Integers are tried before strings, so `add` sums numbers and joins anything else
    dispatcher
        .register_request_handler("add", pair_of("integers", JsonValue::as_i64), |(a, b)| async move {
            Ok(JsonValue::from(a + b))
        })
        .unwrap();
    dispatcher
        .register_request_handler(
            "add",
            pair_of("strings", |v| v.as_str().map(str::to_string)),
            |(a, b)| async move { Ok(JsonValue::from(a + &b)) },
        )
        .unwrap();

    dispatcher
        .register_request_handler("increment_counter", shape::empty(), {
            let state = state.clone();
            move |()| {
                let state = state.clone();
                async move {
                    let mut state = state.lock().unwrap();
                    state.counter += 1;
                    Ok(state.counter)
                }
            }
        })
        .unwrap();
    dispatcher
        .register_request_handler("get_counter", shape::empty(), {
            let state = state.clone();
            move |()| {
                let state = state.clone();
                async move { Ok(state.lock().unwrap().counter) }
            }
        })
        .unwrap();
    dispatcher
        .register_request_handler("set_value", shape::typed::<SetValueParams>(), {
            let state = state.clone();
            move |SetValueParams { key, value }| {
                let state = state.clone();
                async move {
                    state.lock().unwrap().values.insert(key, value);
                    Ok(())
                }
            }
        })
        .unwrap();
    dispatcher
        .register_request_handler("get_value", shape::typed::<GetValueParams>(), {
            let state = state.clone();
            move |GetValueParams { key }| {
                let state = state.clone();
                async move { Ok(state.lock().unwrap().values.get(&key).cloned().unwrap_or(JsonValue::Null)) }
            }
        })
        .unwrap();

    dispatcher
        .register_notification_handler("record_notification", shape::typed::<RecordNotificationParams>(), {
            let state = state.clone();
            move |RecordNotificationParams { message }| {
                let state = state.clone();
                async move {
                    state.lock().unwrap().last_notification = Some(message);
                    Ok(())
                }
            }
        })
        .unwrap();
    dispatcher
        .register_request_handler("get_last_notification", shape::empty(), {
            let state = state.clone();
            move |()| {
                let state = state.clone();
                async move { Ok(state.lock().unwrap().last_notification.clone()) }
            }
        })
        .unwrap();

    dispatcher
        .register_request_handler("fail_with_error", shape::empty(), |()| async move {
            Err::<(), _>(ErrorDetails::server_error(1, "Test error", None).into())
        })
        .unwrap();
    dispatcher
        .register_request_handler("fail_with_internal_error", shape::empty(), |()| async move {
            Err::<(), _>(HandlerError::Internal(anyhow::anyhow!("connection string is hunter2")))
        })
        .unwrap();
    dispatcher
        .register_request_handler("fail_with_panic", shape::empty(), |()| async move {
            if true {
                panic!("OMG we're all gonna die!");
            }
            Ok(())
        })
        .unwrap();

    dispatcher
        .register_request_handler("sleep", shape::typed::<SleepParams>(), |SleepParams { millis }| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(millis)
        })
        .unwrap();

    dispatcher
        .register_request_handler("call_caller_method", shape::typed::<CallCallerMethodParams>(), {
            let peer = peer.clone();
            move |CallCallerMethodParams { method, params }| {
                let peer = peer.clone();
                async move {
                    let peer = peer
                        .get()
                        .and_then(WeakPeer::upgrade)
                        .ok_or_else(|| HandlerError::Internal(anyhow::anyhow!("peer is gone")))?;
                    peer.call_raw(&method, params).await.map_err(forward_call_error)
                }
            }
        })
        .unwrap();
    dispatcher
        .register_request_handler(
            "raise_caller_notification",
            shape::typed::<RaiseCallerNotificationParams>(),
            move |RaiseCallerNotificationParams { method, params }| {
                let peer = peer.clone();
                async move {
                    let peer = peer
                        .get()
                        .and_then(WeakPeer::upgrade)
                        .ok_or_else(|| HandlerError::Internal(anyhow::anyhow!("peer is gone")))?;
                    peer.notify(&method, params).map_err(forward_call_error)
                }
            },
        )
        .unwrap();

    dispatcher
}

/// Errors the remote peer reported are passed along as-is; anything else is internal
fn forward_call_error(error: JsonRpcError) -> HandlerError {
    match error {
        JsonRpcError::MethodError { error, .. } => HandlerError::Rpc(error),
        other => HandlerError::Internal(other.into()),
    }
}

/// Shape accepting exactly two positional params that `extract` accepts
fn pair_of<T: Send + 'static>(
    name: &'static str,
    extract: fn(&JsonValue) -> Option<T>,
) -> impl shape::ParamShape<Output = (T, T)> {
    shape::custom(name, move |params: Option<&JsonValue>| match params.and_then(JsonValue::as_array) {
        Some(items) if items.len() == 2 => match (extract(&items[0]), extract(&items[1])) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(format!("expected two {name}")),
        },
        _ => Err(format!("expected two {name}")),
    })
}

#[derive(Serialize, Deserialize)]
pub struct ConcatParams {
    pub number: i64,
    pub text: String,
}

#[derive(Serialize, Deserialize)]
pub struct SetValueParams {
    pub key: String,
    pub value: JsonValue,
}

#[derive(Serialize, Deserialize)]
pub struct GetValueParams {
    pub key: String,
}

#[derive(Serialize, Deserialize)]
pub struct RecordNotificationParams {
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct SleepParams {
    pub millis: u64,
}

#[derive(Serialize, Deserialize)]
pub struct CallCallerMethodParams {
    pub method: String,
    pub params: Option<JsonValue>,
}

#[derive(Serialize, Deserialize)]
pub struct RaiseCallerNotificationParams {
    pub method: String,
    pub params: Option<JsonValue>,
}
