//! Service descriptors.
//!
//! Services describe their public methods explicitly: parameter validation
//! markers, metric annotations and units of work are registered on each
//! [`ServiceMethod`] and read by the metadata scanner at publish time.

use crate::auth::PRINCIPAL_KEY;
use crate::error::{InvokeError, ServiceFault};
use crate::message::{Arguments, Attributes, Exchange};
use crate::session::UnitOfWork;
use serde_json::Value;
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Operation property holding the `Arc<ServiceMethod>` being dispatched.
pub const TARGET_METHOD_KEY: &str = "zentinel.soap.target-method";

/// Default validation group.
pub const DEFAULT_GROUP: &str = "Default";

/// A SOAP service implementation.
pub trait SoapService: Send + Sync + 'static {
    /// Type, interface and public methods of the service.
    fn descriptor(&self) -> ServiceDescriptor;

    /// Dispatch a call to `method`.
    fn invoke(
        &self,
        context: &ServiceContext<'_>,
        method: &ServiceMethod,
        args: Arguments,
    ) -> Result<Value, ServiceFault>;
}

/// Describes a service implementation.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Canonical name of the implementing type
    pub type_name: String,
    pub interface: ServiceInterface,
    /// Public methods in declaration order
    pub methods: Vec<ServiceMethod>,
}

impl ServiceDescriptor {
    pub fn new(type_name: impl Into<String>, interface: ServiceInterface) -> Self {
        Self {
            type_name: type_name.into(),
            interface,
            methods: Vec::new(),
        }
    }

    /// Add a public method. Methods without a declaring type are declared by
    /// the service type itself.
    pub fn method(mut self, mut method: ServiceMethod) -> Self {
        if method.declaring_type.is_empty() {
            method.declaring_type = self.type_name.clone();
        }
        self.methods.push(method);
        self
    }

    /// Look up a method by simple name; the first overload wins.
    pub fn find_method(&self, name: &str) -> Option<&ServiceMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// A service contract shared by endpoints and client proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInterface {
    pub name: String,
    /// Target namespace of the operation elements
    pub namespace: String,
    pub operations: Vec<InterfaceOperation>,
}

impl ServiceInterface {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            operations: Vec::new(),
        }
    }

    pub fn operation(mut self, operation: InterfaceOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn find_operation(&self, name: &str) -> Option<&InterfaceOperation> {
        self.operations.iter().find(|o| o.name == name)
    }
}

/// Operation of a service interface with its wire parameter names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceOperation {
    pub name: String,
    pub parameters: Vec<String>,
}

impl InterfaceOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn parameter(mut self, name: impl Into<String>) -> Self {
        self.parameters.push(name.into());
        self
    }

    /// Wire name of parameter `index`; `arg<index>` when not declared.
    pub fn parameter_name(&self, index: usize) -> String {
        self.parameters
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("arg{}", index))
    }
}

/// A public method of a service implementation.
#[derive(Debug, Clone, Default)]
pub struct ServiceMethod {
    pub name: String,
    /// Canonical name of the declaring type
    pub declaring_type: String,
    pub parameters: Vec<Parameter>,
    pub annotations: MethodAnnotations,
}

impl ServiceMethod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn declared_by(mut self, type_name: impl Into<String>) -> Self {
        self.declaring_type = type_name.into();
        self
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn timed(mut self, timed: Timed) -> Self {
        self.annotations.timed = Some(timed);
        self
    }

    pub fn metered(mut self, metered: Metered) -> Self {
        self.annotations.metered = Some(metered);
        self
    }

    pub fn exception_metered(mut self, exception_metered: ExceptionMetered) -> Self {
        self.annotations.exception_metered = Some(exception_metered);
        self
    }

    pub fn unit_of_work(mut self, unit_of_work: UnitOfWork) -> Self {
        self.annotations.unit_of_work = Some(unit_of_work);
        self
    }
}

/// A method parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Declared type, used to pick validation constraints
    pub type_name: String,
    pub kind: ParameterKind,
    pub validation: Option<Validation>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            kind: ParameterKind::Value,
            validation: None,
        }
    }

    /// Asynchronous response handler; never validated.
    pub fn async_handler(name: impl Into<String>) -> Self {
        Self {
            kind: ParameterKind::AsyncHandler,
            ..Self::new(name, "AsyncHandler")
        }
    }

    /// Validate with the default group.
    pub fn valid(mut self) -> Self {
        self.validation = Some(Validation::Valid);
        self
    }

    /// Validate with the given groups.
    pub fn validated<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validation = Some(Validation::Validated(
            groups.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Groups this parameter is validated under, if any.
    pub fn validation_groups(&self) -> Option<Vec<String>> {
        match &self.validation {
            Some(Validation::Valid) => Some(vec![DEFAULT_GROUP.to_string()]),
            Some(Validation::Validated(groups)) => Some(groups.clone()),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Value,
    AsyncHandler,
}

/// Validation marker on a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Cascade validation with the default group.
    Valid,
    /// Validation with explicit groups.
    Validated(Vec<String>),
}

/// Metric and transaction annotations of a method.
#[derive(Debug, Clone, Default)]
pub struct MethodAnnotations {
    pub timed: Option<Timed>,
    pub metered: Option<Metered>,
    pub exception_metered: Option<ExceptionMetered>,
    pub unit_of_work: Option<UnitOfWork>,
}

/// Time invocations of a method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timed {
    /// Metric name; derived from the method when empty
    pub name: String,
    /// Use `name` verbatim instead of prefixing the declaring type
    pub absolute: bool,
}

impl Timed {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            absolute: false,
        }
    }

    pub fn absolute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            absolute: true,
        }
    }
}

/// Count invocations of a method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metered {
    pub name: String,
    pub absolute: bool,
}

impl Metered {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            absolute: false,
        }
    }

    pub fn absolute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            absolute: true,
        }
    }
}

/// Count errors of a method matching `cause`.
#[derive(Debug, Clone, Default)]
pub struct ExceptionMetered {
    pub name: String,
    pub absolute: bool,
    pub cause: ExceptionFilter,
}

impl ExceptionMetered {
    /// Suffix appended to derived metric names.
    pub const DEFAULT_NAME_SUFFIX: &'static str = "exceptions";

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn cause(mut self, cause: ExceptionFilter) -> Self {
        self.cause = cause;
        self
    }
}

type ErrorPredicate = dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync;

/// Selects the errors counted by an exception meter.
#[derive(Clone)]
pub struct ExceptionFilter {
    name: &'static str,
    predicate: Arc<ErrorPredicate>,
}

impl ExceptionFilter {
    /// Matches every error.
    pub fn any() -> Self {
        Self {
            name: "any",
            predicate: Arc::new(|_| true),
        }
    }

    /// Matches errors of concrete type `E`.
    pub fn of<E: StdError + 'static>() -> Self {
        Self {
            name: std::any::type_name::<E>(),
            predicate: Arc::new(|error| error.is::<E>()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True when the thrown error or its direct cause matches.
    pub fn matches(&self, error: &InvokeError) -> bool {
        let thrown = error.thrown();
        (self.predicate)(thrown) || thrown.source().is_some_and(|cause| (self.predicate)(cause))
    }
}

impl Default for ExceptionFilter {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Debug for ExceptionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExceptionFilter").field(&self.name).finish()
    }
}

/// Operation descriptor with its property map.
#[derive(Debug, Clone)]
pub struct OperationInfo {
    pub name: String,
    pub namespace: String,
    properties: Attributes,
}

impl OperationInfo {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            properties: Attributes::new(),
        }
    }

    /// Operation dispatched to `method`.
    pub fn for_method(method: Arc<ServiceMethod>, namespace: impl Into<String>) -> Self {
        let mut operation = Self::new(method.name.clone(), namespace);
        operation.properties.insert_shared(TARGET_METHOD_KEY, method);
        operation
    }

    pub fn properties(&self) -> &Attributes {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Attributes {
        &mut self.properties
    }
}

/// Request context visible to a service method.
pub struct ServiceContext<'a> {
    exchange: &'a Exchange,
}

impl<'a> ServiceContext<'a> {
    pub fn new(exchange: &'a Exchange) -> Self {
        Self { exchange }
    }

    /// Principal stored by the authentication interceptor.
    pub fn principal<T: Any>(&self) -> Option<&'a T> {
        self.exchange
            .in_message()
            .attributes()
            .get::<T>(PRINCIPAL_KEY)
    }

    pub fn is_authenticated(&self) -> bool {
        self.exchange
            .in_message()
            .attributes()
            .contains_key(PRINCIPAL_KEY)
    }

    pub fn operation_name(&self) -> Option<&'a str> {
        self.exchange.operation().map(|op| op.name.as_str())
    }

    pub fn message_attributes(&self) -> &'a Attributes {
        self.exchange.in_message().attributes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;

    #[derive(Debug, thiserror::Error)]
    #[error("wrapped")]
    struct Wrapper(#[source] std::io::Error);

    #[test]
    fn test_validation_groups() {
        let plain = Parameter::new("p", "Person");
        assert_eq!(plain.validation_groups(), None);
        assert_eq!(
            Parameter::new("p", "Person").valid().validation_groups(),
            Some(vec!["Default".to_string()])
        );
        assert_eq!(
            Parameter::new("p", "Person")
                .validated(["Create", "Update"])
                .validation_groups(),
            Some(vec!["Create".to_string(), "Update".to_string()])
        );
    }

    #[test]
    fn test_descriptor_defaults_declaring_type() {
        let descriptor = ServiceDescriptor::new(
            "com.example.DummyService",
            ServiceInterface::new("DummyInterface", "http://example.com/"),
        )
        .method(ServiceMethod::new("foo"))
        .method(ServiceMethod::new("bar").declared_by("com.example.Base"));

        assert_eq!(descriptor.methods[0].declaring_type, "com.example.DummyService");
        assert_eq!(descriptor.methods[1].declaring_type, "com.example.Base");
        assert!(descriptor.find_method("bar").is_some());
    }

    #[test]
    fn test_exception_filter_matches_type_or_cause() {
        let io = ExceptionFilter::of::<std::io::Error>();

        let direct = InvokeError::from(ServiceFault::new(std::io::Error::other("disk")));
        assert!(io.matches(&direct));

        let wrapped = InvokeError::from(ServiceFault::new(Wrapper(std::io::Error::other("disk"))));
        assert!(io.matches(&wrapped));

        let other = InvokeError::from(ServiceFault::msg("plain"));
        assert!(!io.matches(&other));
        assert!(ExceptionFilter::any().matches(&other));
    }

    #[test]
    fn test_exception_filter_sees_session_cause() {
        let filter = ExceptionFilter::of::<SessionError>();
        let err = InvokeError::from(SessionError::Transaction("commit".into()));
        assert!(filter.matches(&err));
    }

    #[test]
    fn test_parameter_name_fallback() {
        let op = InterfaceOperation::new("foo").parameter("person");
        assert_eq!(op.parameter_name(0), "person");
        assert_eq!(op.parameter_name(1), "arg1");
    }
}
