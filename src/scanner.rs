//! Per-method metadata tables built from a service descriptor.

use crate::metrics::MetricRegistry;
use crate::service::{ExceptionFilter, ExceptionMetered, ServiceDescriptor};
use crate::session::UnitOfWork;
use std::collections::HashMap;

/// Registry name and optional error filter for one instrumented method.
#[derive(Debug, Clone)]
pub struct MetricSpec {
    pub name: String,
    pub cause: Option<ExceptionFilter>,
}

/// Annotation tables keyed by method name.
///
/// Methods are keyed by simple name: when a service declares overloads, the
/// first declaration wins.
#[derive(Debug, Clone, Default)]
pub struct MethodMetadata {
    pub timers: HashMap<String, MetricSpec>,
    pub meters: HashMap<String, MetricSpec>,
    pub exception_meters: HashMap<String, MetricSpec>,
    pub units_of_work: HashMap<String, UnitOfWork>,
}

impl MethodMetadata {
    pub fn scan(descriptor: &ServiceDescriptor) -> Self {
        let mut metadata = Self::default();

        for method in &descriptor.methods {
            let annotations = &method.annotations;
            let declaring_type = method.declaring_type.as_str();

            if let Some(timed) = &annotations.timed {
                metadata
                    .timers
                    .entry(method.name.clone())
                    .or_insert_with(|| MetricSpec {
                        name: metric_name(declaring_type, &method.name, &timed.name, timed.absolute, None),
                        cause: None,
                    });
            }

            if let Some(metered) = &annotations.metered {
                metadata
                    .meters
                    .entry(method.name.clone())
                    .or_insert_with(|| MetricSpec {
                        name: metric_name(declaring_type, &method.name, &metered.name, metered.absolute, None),
                        cause: None,
                    });
            }

            if let Some(exception_metered) = &annotations.exception_metered {
                metadata
                    .exception_meters
                    .entry(method.name.clone())
                    .or_insert_with(|| MetricSpec {
                        name: metric_name(
                            declaring_type,
                            &method.name,
                            &exception_metered.name,
                            exception_metered.absolute,
                            Some(ExceptionMetered::DEFAULT_NAME_SUFFIX),
                        ),
                        cause: Some(exception_metered.cause.clone()),
                    });
            }

            if let Some(unit_of_work) = annotations.unit_of_work {
                metadata
                    .units_of_work
                    .entry(method.name.clone())
                    .or_insert(unit_of_work);
            }
        }

        metadata
    }

    pub fn has_metrics(&self) -> bool {
        !(self.timers.is_empty() && self.meters.is_empty() && self.exception_meters.is_empty())
    }
}

/// Explicit names are used verbatim when absolute and prefixed by the
/// declaring type otherwise; without one, the name is derived from the method.
fn metric_name(
    declaring_type: &str,
    method: &str,
    explicit: &str,
    absolute: bool,
    default_suffix: Option<&str>,
) -> String {
    if explicit.is_empty() {
        MetricRegistry::name(declaring_type, &[method, default_suffix.unwrap_or_default()])
    } else if absolute {
        explicit.to_string()
    } else {
        MetricRegistry::name(declaring_type, &[explicit])
    }
}
