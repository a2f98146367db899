// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription and service handlers.

use crate::error::{Error, Result};
use crate::message::{encode_to_vec, Message, MessageInfo};
use std::marker::PhantomData;
use std::sync::Arc;

/// Raw-bytes subscription callback.
pub type RawCallback = Arc<dyn Fn(&[u8], &MessageInfo) + Send + Sync>;

/// Type-erased typed subscription.
pub trait TypedHandler: Send + Sync {
    /// Type tag the handler decodes.
    fn type_name(&self) -> &'static str;

    /// Decode `payload` and run the user callback.
    fn invoke(&self, payload: &[u8], info: &MessageInfo) -> Result<()>;
}

struct TypedCallback<M, F> {
    callback: F,
    _marker: PhantomData<fn(M)>,
}

impl<M, F> TypedHandler for TypedCallback<M, F>
where
    M: Message,
    F: Fn(&str, &M) + Send + Sync + 'static,
{
    fn type_name(&self) -> &'static str {
        M::type_name()
    }

    fn invoke(&self, payload: &[u8], info: &MessageInfo) -> Result<()> {
        let msg = M::decode(payload)?;
        (self.callback)(&info.topic, &msg);
        Ok(())
    }
}

/// The single callback slot of a (Node, topic) pair.
#[derive(Clone)]
pub enum SubscriptionHandler {
    Typed(Arc<dyn TypedHandler>),
    Raw(RawCallback),
}

impl SubscriptionHandler {
    pub fn typed<M, F>(callback: F) -> Self
    where
        M: Message,
        F: Fn(&str, &M) + Send + Sync + 'static,
    {
        SubscriptionHandler::Typed(Arc::new(TypedCallback {
            callback,
            _marker: PhantomData,
        }))
    }

    pub fn raw<F>(callback: F) -> Self
    where
        F: Fn(&[u8], &MessageInfo) + Send + Sync + 'static,
    {
        SubscriptionHandler::Raw(Arc::new(callback))
    }
}

impl std::fmt::Debug for SubscriptionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionHandler::Typed(h) => write!(f, "Typed({})", h.type_name()),
            SubscriptionHandler::Raw(_) => f.write_str("Raw"),
        }
    }
}

/// Type-erased service provider.
pub trait ServiceHandler: Send + Sync {
    /// Decode the request, run the provider, encode the reply.
    fn call(&self, request: &[u8]) -> Result<Vec<u8>>;
}

struct ServiceCallback<Req, Rep, F> {
    callback: F,
    _marker: PhantomData<fn(Req) -> Rep>,
}

impl<Req, Rep, F> ServiceHandler for ServiceCallback<Req, Rep, F>
where
    Req: Message,
    Rep: Message,
    F: Fn(&Req) -> Result<Rep> + Send + Sync + 'static,
{
    fn call(&self, request: &[u8]) -> Result<Vec<u8>> {
        let req = Req::decode(request)?;
        let rep = (self.callback)(&req)?;
        encode_to_vec(&rep)
    }
}

/// Wrap a typed provider closure.
pub(crate) fn service_handler<Req, Rep, F>(callback: F) -> Arc<dyn ServiceHandler>
where
    Req: Message,
    Rep: Message,
    F: Fn(&Req) -> Result<Rep> + Send + Sync + 'static,
{
    Arc::new(ServiceCallback {
        callback,
        _marker: PhantomData,
    })
}

/// Run a provider with panic isolation. Errors come back as the text sent
/// to the requester.
pub(crate) fn call_service(
    service: &str,
    handler: &Arc<dyn ServiceHandler>,
    request: &[u8],
) -> std::result::Result<Vec<u8>, String> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.call(request))) {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(e)) => {
            log::debug!("[Service] '{}' handler failed: {}", service, e);
            Err(e.to_string())
        }
        Err(_) => {
            log::warn!("[Service] '{}' handler panicked", service);
            Err(Error::ServiceFailed(format!("'{}' handler panicked", service)).to_string())
        }
    }
}
