//! In-process SOAP runtime: server registry and request dispatch.
//!
//! Dispatch runs synchronously on the calling thread; async transports hand
//! requests over through `spawn_blocking`.

use crate::auth::parse_basic_authorization;
use crate::endpoint::{Endpoint, EndpointState, Server};
use crate::error::{soap_fault_response, Fault, FaultCode, SoapHostError};
use crate::interceptor::{Interceptor, InterceptorChain, Phase};
use crate::invoker::Invoker;
use crate::message::{Arguments, Exchange, FaultMode, Message, SecurityToken};
use crate::mtom;
use crate::parser::{parse_soap_action, parse_soap_envelope};
use crate::service::OperationInfo;
use crate::wsdl;
use crate::writer;
use http::{header, Method, Request, Response, StatusCode};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry of servers and the entry point for inbound requests.
#[derive(Default)]
pub struct Bus {
    servers: RwLock<Vec<Arc<RegisteredServer>>>,
}

/// A server with its assembled interceptor chains.
struct RegisteredServer {
    server: Arc<Server>,
    in_chain: InterceptorChain,
    out_chain: InterceptorChain,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a configured endpoint.
    pub fn register(&self, endpoint: Endpoint) -> Result<Arc<Server>, SoapHostError> {
        if endpoint.operation_names().is_empty() {
            return Err(SoapHostError::EndpointPublishFailed(format!(
                "service {} exposes no operations",
                endpoint.descriptor().type_name
            )));
        }

        let mut servers = self.servers.write();
        let in_use = servers.iter().any(|registered| {
            registered.server.info().address == endpoint.address()
                && registered.server.state() != EndpointState::Shutdown
        });
        if in_use {
            return Err(SoapHostError::EndpointPublishFailed(format!(
                "address {} is already in use",
                endpoint.address()
            )));
        }

        let registered = RegisteredServer::assemble(endpoint);
        let server = registered.server.clone();
        servers.push(Arc::new(registered));
        Ok(server)
    }

    pub fn servers(&self) -> Vec<Arc<Server>> {
        self.servers
            .read()
            .iter()
            .map(|registered| registered.server.clone())
            .collect()
    }

    /// The live or published server at `address` implemented by `type_name`.
    pub fn find_server(&self, address: &str, type_name: &str) -> Option<Arc<Server>> {
        self.servers()
            .into_iter()
            .filter(|server| server.state() != EndpointState::Shutdown)
            .find(|server| {
                server.info().address == address
                    && server.endpoint().descriptor().type_name == type_name
            })
    }

    /// Move every server in `from` to `to`; returns the servers moved.
    pub fn transition(&self, from: EndpointState, to: EndpointState) -> Vec<Arc<Server>> {
        let moved: Vec<_> = self
            .servers()
            .into_iter()
            .filter(|server| server.state() == from)
            .collect();
        for server in &moved {
            server.set_state(to);
        }
        moved
    }

    fn lookup(&self, address: &str) -> Option<Arc<RegisteredServer>> {
        let servers = self.servers.read();
        servers
            .iter()
            .rev()
            .find(|registered| {
                registered.server.info().address == address
                    && registered.server.state() != EndpointState::Shutdown
            })
            .or_else(|| {
                servers
                    .iter()
                    .rev()
                    .find(|registered| registered.server.info().address == address)
            })
            .cloned()
    }

    /// Handle one request addressed to `address`.
    pub fn dispatch(&self, address: &str, request: Request<Vec<u8>>) -> Response<Vec<u8>> {
        let Some(registered) = self.lookup(address) else {
            debug!(address = %address, "No endpoint at address");
            return plain_response(StatusCode::NOT_FOUND, "No service was found.");
        };

        if registered.server.state() == EndpointState::Shutdown {
            return plain_response(StatusCode::SERVICE_UNAVAILABLE, "Endpoint is shut down.");
        }

        let wants_description = request
            .uri()
            .query()
            .is_some_and(|query| query.split('&').any(|p| p.eq_ignore_ascii_case("wsdl")));

        if request.method() == Method::GET && wants_description {
            let description = wsdl::describe(registered.server.endpoint());
            let mut response = Response::new(description.into_bytes());
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/xml; charset=utf-8"),
            );
            return response;
        }
        if request.method() != Method::POST {
            return plain_response(StatusCode::METHOD_NOT_ALLOWED, "Only POST is supported.");
        }
        registered.handle(request)
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addresses: Vec<String> = self
            .servers()
            .iter()
            .map(|server| server.info().address.clone())
            .collect();
        f.debug_struct("Bus").field("servers", &addresses).finish()
    }
}

impl RegisteredServer {
    fn assemble(endpoint: Endpoint) -> Self {
        let operations: HashMap<String, Arc<OperationInfo>> = endpoint
            .operation_names()
            .into_iter()
            .filter_map(|name| {
                endpoint
                    .operation(name)
                    .map(|operation| (name.to_string(), operation.clone()))
            })
            .collect();

        let mut in_chain = InterceptorChain::new();
        in_chain.add(Arc::new(EnvelopeInterceptor { operations }));
        in_chain.add(Arc::new(InvokeInterceptor {
            invoker: endpoint.invoker().clone(),
        }));
        in_chain.extend(endpoint.in_interceptors().iter().cloned());

        let mut out_chain = InterceptorChain::new();
        out_chain.add(Arc::new(MarshalInterceptor));
        out_chain.add(Arc::new(MtomInterceptor));
        out_chain.extend(endpoint.out_interceptors().iter().cloned());

        Self {
            server: Arc::new(Server::new(endpoint)),
            in_chain,
            out_chain,
        }
    }

    fn handle(&self, request: Request<Vec<u8>>) -> Response<Vec<u8>> {
        let (parts, body) = request.into_parts();
        let mut message = Message::with_content(parts.headers, body);
        if let Some(policy) = message
            .header(header::AUTHORIZATION.as_str())
            .and_then(parse_basic_authorization)
        {
            message.set_authorization_policy(policy);
        }

        let mut exchange = Exchange::for_endpoint(message, self.server.info().clone());

        if let Err(fault) = self.in_chain.run(&mut exchange) {
            self.run_in_fault_interceptors(&mut exchange);
            return self.fault_response(&mut exchange, fault.code, &fault.message);
        }
        if let Some(response) = exchange.take_committed() {
            return response;
        }
        if let Some(err) = exchange.take_fault() {
            self.run_in_fault_interceptors(&mut exchange);
            let code = err.fault_code();
            let reason = err.to_string();
            if exchange.in_message().fault_mode() == Some(FaultMode::CheckedApplicationFault) {
                info!(address = %self.server.info().address, fault = %reason.trim(), "Application fault");
            } else {
                warn!(address = %self.server.info().address, error = ?err, "Service invocation failed");
            }
            return self.fault_response(&mut exchange, code, &reason);
        }

        if let Err(fault) = self.out_chain.run(&mut exchange) {
            return self.fault_response(&mut exchange, fault.code, &fault.message);
        }
        if exchange.committed().is_none() {
            exchange.send_back_channel();
        }
        exchange
            .take_committed()
            .unwrap_or_else(|| plain_response(StatusCode::INTERNAL_SERVER_ERROR, ""))
    }

    /// Runs on inbound faults, before the fault message is built.
    fn run_in_fault_interceptors(&self, exchange: &mut Exchange) {
        if let Err(fault) = self
            .server
            .endpoint()
            .in_fault_interceptors()
            .run(exchange)
        {
            warn!(error = %fault, "In-fault interceptor failed");
        }
    }

    fn fault_response(&self, exchange: &mut Exchange, code: FaultCode, reason: &str) -> Response<Vec<u8>> {
        let version = self.server.info().binding.version();
        debug!(code = %code, "Sending SOAP fault");

        let out = exchange.out_message_mut();
        *out = Message::new();
        out.set_response_code(StatusCode::INTERNAL_SERVER_ERROR);
        out.set_header(header::CONTENT_TYPE, version.content_type());
        out.set_content(soap_fault_response(code, reason, version).into_bytes());

        if let Err(fault) = self
            .server
            .endpoint()
            .out_fault_interceptors()
            .run(exchange)
        {
            warn!(error = %fault, "Out-fault interceptor failed");
        }
        if exchange.committed().is_none() {
            exchange.send_back_channel();
        }
        exchange
            .take_committed()
            .unwrap_or_else(|| plain_response(StatusCode::INTERNAL_SERVER_ERROR, ""))
    }
}

fn plain_response(status: StatusCode, text: &str) -> Response<Vec<u8>> {
    let mut response = Response::new(text.as_bytes().to_vec());
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Parses the envelope, extracts the security token and selects the
/// operation and its arguments.
struct EnvelopeInterceptor {
    operations: HashMap<String, Arc<OperationInfo>>,
}

impl Interceptor for EnvelopeInterceptor {
    fn phase(&self) -> Phase {
        Phase::ReadHeaders
    }

    fn handle_message(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        let message = exchange.in_message();
        let content = match message.header(header::CONTENT_TYPE.as_str()) {
            Some(content_type) if mtom::is_multipart(content_type) => {
                mtom::unwrap(content_type, message.content())
                    .ok_or_else(|| Fault::client("Malformed multipart message"))?
            }
            _ => message.content().to_vec(),
        };
        let envelope = parse_soap_envelope(&content).map_err(|e| Fault::client(e.to_string()))?;

        let operation_name = envelope.body.operation.clone().or_else(|| {
            exchange
                .in_message()
                .header("soapaction")
                .map(parse_soap_action)
                .and_then(|action| {
                    action
                        .rsplit(['/', '#'])
                        .next()
                        .filter(|name| !name.is_empty())
                        .map(String::from)
                })
        });
        let Some(operation_name) = operation_name else {
            return Err(Fault::client("No operation in request body"));
        };
        let operation = self.operations.get(&operation_name).ok_or_else(|| {
            Fault::client(format!("Unexpected wrapper element {} found", operation_name))
        })?;

        let arguments: Vec<_> = envelope
            .body
            .parameters
            .iter()
            .map(|parameter| parameter.to_value())
            .collect();
        let token = envelope
            .header
            .as_ref()
            .and_then(|h| h.security.as_ref())
            .and_then(|s| s.username_token.clone());

        if let Some(token) = token {
            exchange
                .in_message_mut()
                .set_security_token(SecurityToken::UsernameToken(token));
        }
        exchange.set_operation(operation.clone());
        exchange.set_arguments(Arguments::from(arguments));
        exchange.set_envelope(envelope);
        Ok(())
    }
}

/// Runs the endpoint's invoker chain.
struct InvokeInterceptor {
    invoker: Arc<dyn Invoker>,
}

impl Interceptor for InvokeInterceptor {
    fn phase(&self) -> Phase {
        Phase::Invoke
    }

    fn handle_message(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        let args = exchange.take_arguments();
        match self.invoker.invoke(exchange, args) {
            Ok(result) => exchange.set_result(result),
            Err(err) => exchange.set_fault(err),
        }
        Ok(())
    }
}

/// Writes the `<operation>Response` envelope.
struct MarshalInterceptor;

impl Interceptor for MarshalInterceptor {
    fn phase(&self) -> Phase {
        Phase::Marshal
    }

    fn handle_message(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        let (Some(endpoint), Some(operation)) = (exchange.endpoint().cloned(), exchange.operation().cloned())
        else {
            return Err(Fault::server("No operation to respond to"));
        };

        let mut content = String::new();
        if let Some(result) = exchange.result() {
            writer::write_value("return", result, &mut content);
        }
        let body = writer::operation_element(
            &format!("{}Response", operation.name),
            &operation.namespace,
            &content,
        );
        let version = endpoint.binding.version();

        let out = exchange.out_message_mut();
        out.set_response_code(StatusCode::OK);
        out.set_header(header::CONTENT_TYPE, version.content_type());
        out.set_content(writer::envelope(version, None, &body).into_bytes());
        Ok(())
    }
}

/// Packages the response as MTOM when the binding asks for it.
struct MtomInterceptor;

impl Interceptor for MtomInterceptor {
    fn phase(&self) -> Phase {
        Phase::PostMarshal
    }

    fn handle_message(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        let Some(binding) = exchange.endpoint().map(|e| e.binding.clone()) else {
            return Ok(());
        };
        if !binding.is_mtom_enabled() {
            return Ok(());
        }
        let out = exchange.out_message_mut();
        let (content_type, body) = mtom::wrap(out.content(), binding.version());
        out.set_header(header::CONTENT_TYPE, &content_type);
        out.set_content(body);
        Ok(())
    }
}
