use super::{target_method, Invoker};
use crate::error::InvokeError;
use crate::message::{Arguments, Exchange, FaultMode};
use crate::service::ParameterKind;
use crate::validation::Validator;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Validates marked parameters before the call proceeds.
pub struct ValidatingInvoker {
    underlying: Arc<dyn Invoker>,
    validator: Arc<dyn Validator>,
}

impl ValidatingInvoker {
    pub fn new(underlying: Arc<dyn Invoker>, validator: Arc<dyn Validator>) -> Self {
        Self {
            underlying,
            validator,
        }
    }

    /// Violations of the first marked parameter that fails validation.
    fn violations(&self, exchange: &Exchange, args: &Arguments) -> Result<Vec<String>, InvokeError> {
        let method = target_method(exchange)?;

        for (parameter, value) in method.parameters.iter().zip(args.params()) {
            if parameter.kind == ParameterKind::AsyncHandler {
                continue;
            }
            let Some(groups) = parameter.validation_groups() else {
                continue;
            };
            let errors = self.validator.validate(value, &parameter.type_name, &groups);
            if !errors.is_empty() {
                return Ok(errors);
            }
        }
        Ok(Vec::new())
    }
}

impl Invoker for ValidatingInvoker {
    fn invoke(&self, exchange: &mut Exchange, args: Arguments) -> Result<Value, InvokeError> {
        let errors = self.violations(exchange, &args)?;
        if errors.is_empty() {
            return self.underlying.invoke(exchange, args);
        }

        debug!(
            operation = ?exchange.operation().map(|op| op.name.as_str()),
            violation_count = errors.len(),
            "Rejecting invalid arguments"
        );
        exchange
            .in_message_mut()
            .set_fault_mode(FaultMode::CheckedApplicationFault);

        let mut message = String::from("\n");
        for error in errors {
            message.push_str("    ");
            message.push_str(&error);
            message.push('\n');
        }
        Err(InvokeError::InvalidArgument(message))
    }
}
