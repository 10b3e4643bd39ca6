use std::fmt;

/// Request/response cardinality of a gRPC method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    Unary,
    ServerStreaming,
    ClientStreaming,
    BidiStreaming,
}

impl CallShape {
    pub fn from_streaming(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => CallShape::Unary,
            (false, true) => CallShape::ServerStreaming,
            (true, false) => CallShape::ClientStreaming,
            (true, true) => CallShape::BidiStreaming,
        }
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallShape::Unary => "unary",
            CallShape::ServerStreaming => "server-streaming",
            CallShape::ClientStreaming => "client-streaming",
            CallShape::BidiStreaming => "bidi-streaming",
        };
        f.write_str(name)
    }
}

/// A gRPC method exposed by the stub, as described by the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    /// Fully qualified service name, e.g. `routeguide.RouteGuide`
    pub service: String,
    pub name: String,
    pub shape: CallShape,
}

impl Method {
    pub fn new(service: impl Into<String>, name: impl Into<String>, shape: CallShape) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            shape,
        }
    }

    /// Build from a fully qualified method name such as `pkg.Service.Method`
    pub fn from_full_name(full_name: &str, shape: CallShape) -> Self {
        let (service, name) = split_full_name(full_name);
        Self::new(service, name, shape)
    }

    /// HTTP/2 path the method is served on, e.g. `/pkg.Service/Method`
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.name)
    }
}

/// Splits `pkg.Service.Method` on its last `.` into service and method
pub fn split_full_name(full_name: &str) -> (&str, &str) {
    match full_name.rsplit_once('.') {
        Some((service, method)) => (service, method),
        None => ("", full_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_shape_from_streaming() {
        assert_eq!(CallShape::from_streaming(false, false), CallShape::Unary);
        assert_eq!(CallShape::from_streaming(false, true), CallShape::ServerStreaming);
        assert_eq!(CallShape::from_streaming(true, false), CallShape::ClientStreaming);
        assert_eq!(CallShape::from_streaming(true, true), CallShape::BidiStreaming);
    }

    #[test]
    fn test_method_from_full_name() {
        let method = Method::from_full_name("routeguide.RouteGuide.GetFeature", CallShape::Unary);
        assert_eq!(method.service, "routeguide.RouteGuide");
        assert_eq!(method.name, "GetFeature");
        assert_eq!(method.path(), "/routeguide.RouteGuide/GetFeature");
    }

    #[test]
    fn test_split_full_name_without_package() {
        assert_eq!(split_full_name("Ping"), ("", "Ping"));
        assert_eq!(split_full_name("a.b.c.D"), ("a.b.c", "D"));
    }
}
