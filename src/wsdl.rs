//! Service description served at `GET <endpoint>?wsdl`.

use crate::binding::{SoapVersion, SOAP_11_BINDING, SOAP_12_BINDING};
use crate::endpoint::Endpoint;
use crate::error::xml_escape;

/// Render a WSDL 1.1 document for `endpoint`, advertising its published URL
/// when one is configured and its internal address otherwise.
pub fn describe(endpoint: &Endpoint) -> String {
    let info = endpoint.info();
    let interface = xml_escape(&info.interface_name);
    let namespace = xml_escape(&info.namespace);
    let soap_ns = match info.binding.version() {
        SoapVersion::Soap11 => SOAP_11_BINDING,
        SoapVersion::Soap12 => SOAP_12_BINDING,
    };

    let mut messages = String::new();
    let mut port_operations = String::new();
    let mut binding_operations = String::new();
    for name in endpoint.operation_names() {
        let name = xml_escape(name);
        messages.push_str(&format!(
            r#"  <wsdl:message name="{name}"><wsdl:part name="parameters" element="tns:{name}"/></wsdl:message>
  <wsdl:message name="{name}Response"><wsdl:part name="parameters" element="tns:{name}Response"/></wsdl:message>
"#
        ));
        port_operations.push_str(&format!(
            r#"    <wsdl:operation name="{name}">
      <wsdl:input message="tns:{name}"/>
      <wsdl:output message="tns:{name}Response"/>
    </wsdl:operation>
"#
        ));
        binding_operations.push_str(&format!(
            r#"    <wsdl:operation name="{name}">
      <soap:operation soapAction=""/>
      <wsdl:input><soap:body use="literal"/></wsdl:input>
      <wsdl:output><soap:body use="literal"/></wsdl:output>
    </wsdl:operation>
"#
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/" xmlns:soap="{soap_ns}" xmlns:tns="{namespace}" name="{interface}Service" targetNamespace="{namespace}">
{messages}  <wsdl:portType name="{interface}">
{port_operations}  </wsdl:portType>
  <wsdl:binding name="{interface}SoapBinding" type="tns:{interface}">
    <soap:binding style="document" transport="http://schemas.xmlsoap.org/soap/http"/>
{binding_operations}  </wsdl:binding>
  <wsdl:service name="{interface}Service">
    <wsdl:port name="{interface}Port" binding="tns:{interface}SoapBinding">
      <soap:address location="{location}"/>
    </wsdl:port>
  </wsdl:service>
</wsdl:definitions>"#,
        location = xml_escape(info.advertised_address()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceFault;
    use crate::message::Arguments;
    use crate::parser::parse_document;
    use crate::service::{
        InterfaceOperation, ServiceContext, ServiceDescriptor, ServiceInterface, ServiceMethod,
        SoapService,
    };
    use serde_json::Value;
    use std::sync::Arc;

    struct Hello;

    impl SoapService for Hello {
        fn descriptor(&self) -> ServiceDescriptor {
            ServiceDescriptor::new(
                "com.example.Hello",
                ServiceInterface::new("Hello", "http://example.com/hello")
                    .operation(InterfaceOperation::new("sayHi")),
            )
            .method(ServiceMethod::new("sayHi"))
        }

        fn invoke(&self, _: &ServiceContext<'_>, _: &ServiceMethod, _: Arguments) -> Result<Value, ServiceFault> {
            Ok(Value::Null)
        }
    }

    fn location(wsdl: &str) -> String {
        let document = parse_document(wsdl.as_bytes()).unwrap();
        document
            .child("service")
            .and_then(|s| s.child("port"))
            .and_then(|p| p.child("address"))
            .and_then(|a| a.attribute("location"))
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_advertises_internal_address() {
        let endpoint = Endpoint::new("/hello", Arc::new(Hello));
        let wsdl = describe(&endpoint);
        assert_eq!(location(&wsdl), "/hello");
        assert!(wsdl.contains(r#"<wsdl:operation name="sayHi">"#));
    }

    #[test]
    fn test_advertises_published_url() {
        let mut endpoint = Endpoint::new("/hello", Arc::new(Hello));
        endpoint.set_published_url("http://external/prefix/hello");
        assert_eq!(location(&describe(&endpoint)), "http://external/prefix/hello");
    }
}
