//! `ServiceRegistry` - service name -> descriptor, plus request dispatch.
//!
//! Services are registered at startup, before the server runs, and never
//! removed. Dispatch happens on the reactor thread, one request at a time.
//!
//! # Dispatch
//!
//! A request is checked in this order, and the first failure is answered
//! with an ERROR envelope carrying the matching `ErrorCode`:
//!
//! 1. envelope type is REQUEST
//! 2. method name is non-empty
//! 3. service name is non-empty
//! 4. the service is registered
//! 5. the service knows the method
//! 6. the request payload is non-empty
//!
//! Then the payload is decoded into the method's request type, the method
//! runs, and its response is encoded into a RESPONSE envelope with the
//! request's id. Bytes that do not parse as an envelope at all are
//! answered with id 0.

use std::collections::HashMap;

use photon_core::log::Logger;
use photon_core::{pdebug, perror, pwarn};
use photon_net::Dispatch;

use crate::envelope::{MessageType, RpcEnvelope};
use crate::error::{Result, RpcError};
use crate::service::Service;

pub struct ServiceRegistry {
    services: HashMap<String, Box<dyn Service>>,
    log: Logger,
}

impl ServiceRegistry {
    pub fn new(log: Logger) -> Self {
        Self {
            services: HashMap::new(),
            log,
        }
    }

    /// Register `service` under `name`. A second registration under the
    /// same name replaces the first.
    pub fn register(&mut self, name: impl Into<String>, service: Box<dyn Service>) {
        let name = name.into();
        if self.services.insert(name.clone(), service).is_some() {
            pwarn!(self.log, "service {} registered twice; keeping the latest", name);
        } else {
            pdebug!(self.log, "service {} registered", name);
        }
    }

    /// Register under the service's own name.
    pub fn add<S: Service + 'static>(&mut self, service: S) {
        let name = service.name().to_string();
        self.register(name, Box::new(service));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Registered names, sorted.
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Answer one serialized envelope with one serialized envelope.
    pub fn dispatch(&mut self, bytes: &[u8]) -> Vec<u8> {
        let (id, outcome) = match RpcEnvelope::from_bytes(bytes) {
            Ok(request) => (request.id, self.call(&request)),
            Err(e) => (0, Err(e)),
        };

        let reply = match outcome {
            Ok(payload) => RpcEnvelope::response(id, payload),
            Err(e) => {
                pdebug!(self.log, "request id={} rejected: {}", id, e);
                RpcEnvelope::error(id, &e)
            }
        };
        match reply.to_bytes() {
            Ok(out) => out,
            Err(e) => {
                perror!(self.log, "cannot encode reply for id={}: {}", id, e);
                Vec::new()
            }
        }
    }

    fn call(&mut self, request: &RpcEnvelope) -> Result<Vec<u8>> {
        if request.kind != MessageType::Request {
            return Err(RpcError::NotARequest(request.kind));
        }
        if request.method_name.is_empty() {
            return Err(RpcError::EmptyMethod);
        }
        if request.service_name.is_empty() {
            return Err(RpcError::EmptyService);
        }
        let service = self
            .services
            .get_mut(&request.service_name)
            .ok_or_else(|| RpcError::ServiceNotFound(request.service_name.clone()))?;
        let method = request.method_name.as_str();
        let not_found = || RpcError::MethodNotFound {
            service: request.service_name.clone(),
            method: request.method_name.clone(),
        };
        if !service.has_method(method) {
            return Err(not_found());
        }
        if request.request.is_empty() {
            return Err(RpcError::EmptyPayload);
        }

        let mut req = service.new_request(method).ok_or_else(not_found)?;
        req.merge_from_bytes(&request.request)
            .map_err(|e| RpcError::BadRequest(e.to_string()))?;
        let mut resp = service.new_response(method).ok_or_else(not_found)?;

        service.invoke(method, req.as_ref(), resp.as_mut())?;

        resp.to_bytes().map_err(|e| RpcError::BadResponse(e.to_string()))
    }
}

impl Dispatch for ServiceRegistry {
    fn dispatch(&mut self, request: &[u8]) -> Vec<u8> {
        ServiceRegistry::dispatch(self, request)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.service_names())
            .finish()
    }
}
