use std::fmt;

/// Status codes of the protocol.
///
/// Every registered code belongs to exactly one [`StatusClass`], determined by
/// its tens digit:
/// - `1x` Input: the resource wants a line of user input, meta is the prompt
/// - `2x` Success: a body follows, meta is its media type
/// - `3x` Redirect: meta is the new target URL
/// - `4x` Temporary failure: an identical request may succeed later
/// - `5x` Permanent failure: identical requests will keep failing
/// - `6x` Client certificate required
///
/// `Undefined` stands for code `0` and anything outside the registered table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 0, the empty value
    #[default]
    Undefined,
    /// 10 INPUT
    Input,
    /// 11 SENSITIVE INPUT
    SensitiveInput,
    /// 20 SUCCESS
    Success,
    /// 30 REDIRECT - TEMPORARY
    Redirect,
    /// 31 REDIRECT - PERMANENT
    RedirectPermanent,
    /// 40 TEMPORARY FAILURE
    TemporaryFailure,
    /// 41 SERVER UNAVAILABLE
    ServerUnavailable,
    /// 42 CGI ERROR
    CgiError,
    /// 43 PROXY ERROR
    ProxyError,
    /// 44 SLOW DOWN
    SlowDown,
    /// 50 PERMANENT FAILURE
    PermanentFailure,
    /// 51 NOT FOUND
    NotFound,
    /// 52 GONE
    Gone,
    /// 53 PROXY REQUEST REFUSED
    ProxyRequestRefused,
    /// 59 BAD REQUEST
    BadRequest,
    /// 60 CLIENT CERTIFICATE REQUIRED
    ClientCertificateRequired,
    /// 61 CERTIFICATE NOT AUTHORIZED
    CertificateNotAuthorized,
    /// 62 CERTIFICATE NOT VALID
    CertificateNotValid,
}

/// Coarse category of a status code, derived from its tens digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Undefined,
    Input,
    Success,
    Redirect,
    TemporaryFailure,
    PermanentFailure,
    ClientCertificateRequired,
}

/// All registered codes, in ascending order.
pub const REGISTERED: [StatusCode; 18] = [
    StatusCode::Input,
    StatusCode::SensitiveInput,
    StatusCode::Success,
    StatusCode::Redirect,
    StatusCode::RedirectPermanent,
    StatusCode::TemporaryFailure,
    StatusCode::ServerUnavailable,
    StatusCode::CgiError,
    StatusCode::ProxyError,
    StatusCode::SlowDown,
    StatusCode::PermanentFailure,
    StatusCode::NotFound,
    StatusCode::Gone,
    StatusCode::ProxyRequestRefused,
    StatusCode::BadRequest,
    StatusCode::ClientCertificateRequired,
    StatusCode::CertificateNotAuthorized,
    StatusCode::CertificateNotValid,
];

impl StatusCode {
    /// Returns the numeric wire value.
    ///
    /// # Example
    ///
    /// ```
    /// # use gemwire::StatusCode;
    /// assert_eq!(StatusCode::Success.as_u8(), 20);
    /// assert_eq!(StatusCode::BadRequest.as_u8(), 59);
    /// ```
    pub fn as_u8(&self) -> u8 {
        match self {
            StatusCode::Undefined => 0,
            StatusCode::Input => 10,
            StatusCode::SensitiveInput => 11,
            StatusCode::Success => 20,
            StatusCode::Redirect => 30,
            StatusCode::RedirectPermanent => 31,
            StatusCode::TemporaryFailure => 40,
            StatusCode::ServerUnavailable => 41,
            StatusCode::CgiError => 42,
            StatusCode::ProxyError => 43,
            StatusCode::SlowDown => 44,
            StatusCode::PermanentFailure => 50,
            StatusCode::NotFound => 51,
            StatusCode::Gone => 52,
            StatusCode::ProxyRequestRefused => 53,
            StatusCode::BadRequest => 59,
            StatusCode::ClientCertificateRequired => 60,
            StatusCode::CertificateNotAuthorized => 61,
            StatusCode::CertificateNotValid => 62,
        }
    }

    /// Looks up a registered code. Unregistered values, including `0`, yield `None`.
    ///
    /// ```
    /// # use gemwire::StatusCode;
    /// assert_eq!(StatusCode::from_u8(51), Some(StatusCode::NotFound));
    /// assert_eq!(StatusCode::from_u8(25), None);
    /// ```
    pub fn from_u8(code: u8) -> Option<Self> {
        REGISTERED.iter().copied().find(|c| c.as_u8() == code)
    }

    /// Canonical description of the code.
    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Undefined => "<UNDEFINED STATUS CODE>",
            StatusCode::Input => "INPUT",
            StatusCode::SensitiveInput => "SENSITIVE INPUT",
            StatusCode::Success => "SUCCESS",
            StatusCode::Redirect => "REDIRECT - TEMPORARY",
            StatusCode::RedirectPermanent => "REDIRECT - PERMANENT",
            StatusCode::TemporaryFailure => "TEMPORARY FAILURE",
            StatusCode::ServerUnavailable => "SERVER UNAVAILABLE",
            StatusCode::CgiError => "CGI ERROR",
            StatusCode::ProxyError => "PROXY ERROR",
            StatusCode::SlowDown => "SLOW DOWN",
            StatusCode::PermanentFailure => "PERMANENT FAILURE",
            StatusCode::NotFound => "NOT FOUND",
            StatusCode::Gone => "GONE",
            StatusCode::ProxyRequestRefused => "PROXY REQUEST REFUSED",
            StatusCode::BadRequest => "BAD REQUEST",
            StatusCode::ClientCertificateRequired => "CLIENT CERTIFICATE REQUIRED",
            StatusCode::CertificateNotAuthorized => "CERTIFICATE NOT AUTHORIZED",
            StatusCode::CertificateNotValid => "CERTIFICATE NOT VALID",
        }
    }

    /// Code and description, e.g. `"59 BAD REQUEST"`.
    pub fn text(&self) -> String {
        format!("{} {}", self.as_u8(), self.reason())
    }

    pub fn class(&self) -> StatusClass {
        match self.as_u8() / 10 {
            1 => StatusClass::Input,
            2 => StatusClass::Success,
            3 => StatusClass::Redirect,
            4 => StatusClass::TemporaryFailure,
            5 => StatusClass::PermanentFailure,
            6 => StatusClass::ClientCertificateRequired,
            _ => StatusClass::Undefined,
        }
    }

    pub fn is_success(&self) -> bool {
        self.class() == StatusClass::Success
    }

    pub fn is_redirect(&self) -> bool {
        self.class() == StatusClass::Redirect
    }
}

impl StatusClass {
    /// Human readable class name.
    pub fn name(&self) -> &'static str {
        match self {
            StatusClass::Undefined => "undefined",
            StatusClass::Input => "input",
            StatusClass::Success => "success",
            StatusClass::Redirect => "redirect",
            StatusClass::TemporaryFailure => "temporary failure",
            StatusClass::PermanentFailure => "permanent failure",
            StatusClass::ClientCertificateRequired => "client certificate required",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
