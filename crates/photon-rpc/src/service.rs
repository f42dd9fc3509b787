//! Service descriptors.
//!
//! A [`Service`] names its methods and, per method, can produce an empty
//! request and response message and invoke the handler on them. That is
//! all the registry needs to turn bytes into a call.
//!
//! [`ServiceBuilder`] builds one from typed closures:
//!
//! ```ignore
//! let calc = ServiceBuilder::new("CalculateService")
//!     .method("Add", |req: &AddRequest| AddResponse { result: req.a + req.b })
//!     .try_method("Div", |req: &DivRequest| {
//!         if req.b == 0 { Err("division by zero".to_string()) } else { Ok(DivResponse { q: req.a / req.b }) }
//!     })
//!     .build();
//! ```

use std::fmt;

use crate::error::{Result, RpcError};
use crate::message::{new_boxed, DynMessage, Message};

pub trait Service: Send {
    fn name(&self) -> &str;

    /// Method names, in declaration order.
    fn methods(&self) -> Vec<&str>;

    fn has_method(&self, method: &str) -> bool {
        self.methods().contains(&method)
    }

    /// Default-valued request message for `method`.
    fn new_request(&self, method: &str) -> Option<Box<dyn DynMessage>>;

    /// Default-valued response message for `method`.
    fn new_response(&self, method: &str) -> Option<Box<dyn DynMessage>>;

    /// Run `method`, writing its result into `response`.
    fn invoke(
        &mut self,
        method: &str,
        request: &dyn DynMessage,
        response: &mut dyn DynMessage,
    ) -> Result<()>;
}

type Handler = Box<dyn FnMut(&dyn DynMessage, &mut dyn DynMessage) -> Result<()> + Send>;

struct MethodEntry {
    name: String,
    new_request: fn() -> Box<dyn DynMessage>,
    new_response: fn() -> Box<dyn DynMessage>,
    handler: Handler,
}

/// A service assembled from closures by [`ServiceBuilder`].
pub struct FnService {
    name: String,
    methods: Vec<MethodEntry>,
}

impl FnService {
    fn entry(&self, method: &str) -> Option<&MethodEntry> {
        self.methods.iter().find(|m| m.name == method)
    }
}

impl Service for FnService {
    fn name(&self) -> &str {
        &self.name
    }

    fn methods(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.name.as_str()).collect()
    }

    fn has_method(&self, method: &str) -> bool {
        self.entry(method).is_some()
    }

    fn new_request(&self, method: &str) -> Option<Box<dyn DynMessage>> {
        self.entry(method).map(|m| (m.new_request)())
    }

    fn new_response(&self, method: &str) -> Option<Box<dyn DynMessage>> {
        self.entry(method).map(|m| (m.new_response)())
    }

    fn invoke(
        &mut self,
        method: &str,
        request: &dyn DynMessage,
        response: &mut dyn DynMessage,
    ) -> Result<()> {
        let entry = self
            .methods
            .iter_mut()
            .find(|m| m.name == method)
            .ok_or_else(|| RpcError::MethodNotFound {
                service: self.name.clone(),
                method: method.to_string(),
            })?;
        (entry.handler)(request, response)
    }
}

impl fmt::Debug for FnService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnService")
            .field("name", &self.name)
            .field("methods", &self.methods())
            .finish()
    }
}

pub struct ServiceBuilder {
    name: String,
    methods: Vec<MethodEntry>,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Add an infallible method. Re-adding a name replaces the handler.
    pub fn method<Req, Resp, F>(self, name: impl Into<String>, mut f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: FnMut(&Req) -> Resp + Send + 'static,
    {
        self.try_method(name, move |req: &Req| Ok(f(req)))
    }

    /// Add a method whose handler may fail; `Err(text)` reaches the caller
    /// as a `Handler` error.
    pub fn try_method<Req, Resp, F>(mut self, name: impl Into<String>, mut f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: FnMut(&Req) -> std::result::Result<Resp, String> + Send + 'static,
    {
        let name = name.into();
        let handler: Handler = Box::new(move |request: &dyn DynMessage, response: &mut dyn DynMessage| -> Result<()> {
            let req = request
                .as_any()
                .downcast_ref::<Req>()
                .ok_or_else(|| RpcError::BadRequest("request message has the wrong type".into()))?;
            let slot = response
                .as_any_mut()
                .downcast_mut::<Resp>()
                .ok_or_else(|| RpcError::BadResponse("response message has the wrong type".into()))?;
            *slot = f(req).map_err(RpcError::Handler)?;
            Ok(())
        });
        let entry = MethodEntry {
            name: name.clone(),
            new_request: new_boxed::<Req>,
            new_response: new_boxed::<Resp>,
            handler,
        };
        match self.methods.iter_mut().find(|m| m.name == name) {
            Some(existing) => *existing = entry,
            None => self.methods.push(entry),
        }
        self
    }

    pub fn build(self) -> FnService {
        FnService {
            name: self.name,
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Pair {
        a: i32,
        b: i32,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sum {
        result: i32,
    }

    fn calc() -> FnService {
        ServiceBuilder::new("Calc")
            .method("Add", |p: &Pair| Sum { result: p.a + p.b })
            .try_method("Div", |p: &Pair| {
                if p.b == 0 {
                    Err("division by zero".to_string())
                } else {
                    Ok(Sum { result: p.a / p.b })
                }
            })
            .build()
    }

    #[test]
    fn test_descriptor() {
        let svc = calc();
        assert_eq!(svc.name(), "Calc");
        assert_eq!(svc.methods(), vec!["Add", "Div"]);
        assert!(svc.has_method("Add"));
        assert!(!svc.has_method("Mul"));
        assert!(svc.new_request("Mul").is_none());
    }

    #[test]
    fn test_invoke_typed() {
        let mut svc = calc();
        let req: Box<dyn DynMessage> = Box::new(Pair { a: 2, b: 3 });
        let mut resp = svc.new_response("Add").unwrap();
        svc.invoke("Add", req.as_ref(), resp.as_mut()).unwrap();
        assert_eq!(resp.as_any().downcast_ref::<Sum>(), Some(&Sum { result: 5 }));
    }

    #[test]
    fn test_invoke_errors() {
        let mut svc = calc();
        let zero = Pair { a: 1, b: 0 };
        let mut resp = svc.new_response("Div").unwrap();
        assert!(matches!(
            svc.invoke("Div", &zero, resp.as_mut()),
            Err(RpcError::Handler(ref text)) if text == "division by zero"
        ));

        // Wrong concrete request type.
        let mut resp = svc.new_response("Add").unwrap();
        assert!(matches!(
            svc.invoke("Add", &Sum::default(), resp.as_mut()),
            Err(RpcError::BadRequest(_))
        ));

        assert!(matches!(
            svc.invoke("Mul", &zero, resp.as_mut()),
            Err(RpcError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn test_redefining_method_replaces_it() {
        let svc = ServiceBuilder::new("S")
            .method("M", |_: &Pair| Sum { result: 1 })
            .method("M", |_: &Pair| Sum { result: 2 })
            .build();
        assert_eq!(svc.methods(), vec!["M"]);
    }
}
