use serde::Serialize;

/// Structured error information extracted from MongoDB driver errors.
///
/// Serialized into log lines as JSON and rendered into source error
/// messages by [`describe_mongodb_error`].
#[derive(Debug, Default, Clone, Serialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl ErrorInfo {
    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = self.message.as_deref().unwrap_or("unknown error");
        match (&self.name, self.code) {
            (Some(name), Some(code)) => write!(f, "{name} ({code}): {message}"),
            (None, Some(code)) => write!(f, "code {code}: {message}"),
            _ => write!(f, "{message}"),
        }
    }
}

/// Render a MongoDB error as a one-line description suitable for a
/// [`SourceError`](super::SourceError) reason.
pub fn describe_mongodb_error(error: &mongodb::error::Error) -> String {
    extract_error_info(error).to_string()
}

/// Extract structured information from a MongoDB error using the driver API.
///
/// Only the kinds a read-only cursor can hit are broken out; everything else
/// falls back to the driver's `Display` output.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::ErrorKind;

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = if command_error.code_name.is_empty() {
                get_error_name(command_error.code)
            } else {
                Some(command_error.code_name.clone())
            };
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.name = Some("AuthenticationFailed".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.name = Some("ServerSelection".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info
}

/// Get a human-readable error name from a MongoDB error code.
fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        43 => "CursorNotFound",
        50 => "MaxTimeMSExpired",
        175 => "QueryPlanKilled",
        237 => "CursorKilled",
        _ => return None,
    };

    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_for_cursor_codes() {
        assert_eq!(get_error_name(43).as_deref(), Some("CursorNotFound"));
        assert_eq!(get_error_name(237).as_deref(), Some("CursorKilled"));
        assert_eq!(get_error_name(99999), None);
    }

    #[test]
    fn test_error_info_display() {
        let info = ErrorInfo {
            error_type: Some("mongo.command_error".to_string()),
            code: Some(43),
            name: Some("CursorNotFound".to_string()),
            message: Some("cursor id 7 not found".to_string()),
        };
        assert_eq!(info.to_string(), "CursorNotFound (43): cursor id 7 not found");

        let json = info.to_json_compact().unwrap();
        assert!(json.contains("\"type\":\"mongo.command_error\""));
    }

    #[test]
    fn test_error_info_display_without_code() {
        let info = ErrorInfo {
            message: Some("no servers available".to_string()),
            ..Default::default()
        };
        assert_eq!(info.to_string(), "no servers available");
    }

    #[test]
    fn test_describe_custom_driver_error() {
        let err = mongodb::error::Error::custom("boom");
        assert!(!describe_mongodb_error(&err).is_empty());
    }
}
