//! Secret classification for recorded input values.
//!
//! Classification only fires inside an authentication form; everywhere else
//! every field records its literal value.

use serde::{Deserialize, Serialize};

/// Descriptors of an input field, captured alongside the input event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FieldInfo {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autocomplete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

/// Descriptors of the nearest enclosing form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FormInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub has_password_input: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Password,
    Email,
    Phone,
    Otp,
    Token,
}

impl SecretKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Otp => "otp",
            Self::Token => "token",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub is_secret: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SecretKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_name: Option<String>,
}

impl Classification {
    pub fn not_secret() -> Self {
        Self {
            is_secret: false,
            kind: None,
            parameter_name: None,
        }
    }
}

const AUTH_KEYWORDS: &[&str] = &[
    "login", "log-in", "log_in", "signin", "sign-in", "sign_in", "signup", "sign-up", "sign_up",
    "register", "registration", "forgot", "reset", "recover", "verify", "verification", "confirm",
    "auth", "authenticate", "credential", "anmelden", "einloggen", "registrieren", "passwort",
    "connexion", "inscription", "identifiant", "acceso", "iniciar-sesion", "registro", "entrar",
    "cadastro", "登录", "登入", "注册",
];

const VERIFICATION_KEYWORDS: &[&str] = &[
    "verify",
    "verification",
    "confirm",
    "confirmation",
    "otp",
    "one-time",
    "onetime",
    "2fa",
    "mfa",
    "two-factor",
    "code",
    "pin",
    "验证",
];

const PASSWORD_KEYWORDS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "passcode",
    "passphrase",
    "passwort",
    "kennwort",
    "contrasena",
    "contraseña",
    "motdepasse",
    "mot-de-passe",
    "senha",
    "密码",
];

const EMAIL_KEYWORDS: &[&str] = &[
    "email", "e-mail", "mail", "correo", "courriel", "邮箱", "邮件",
];

const PHONE_KEYWORDS: &[&str] = &[
    "phone",
    "mobile",
    "tel",
    "telephone",
    "cellphone",
    "celular",
    "telefon",
    "手机",
    "电话",
];

const TOKEN_KEYWORDS: &[&str] = &[
    "token",
    "apikey",
    "api-key",
    "api_key",
    "secret",
    "accesskey",
    "access-key",
    "access_key",
    "client_secret",
    "client-secret",
    "bearer",
];

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| haystack.contains(keyword))
}

/// A form gates classification when its identifying attributes match an
/// authentication keyword, or when it contains a password-type input.
pub fn is_authentication_form(form: &FormInfo) -> bool {
    if form.has_password_input {
        return true;
    }
    let haystack = [
        form.id.as_deref().unwrap_or(""),
        form.action.as_deref().unwrap_or(""),
        &form.classes.join(" "),
        form.aria_label.as_deref().unwrap_or(""),
        form.title.as_deref().unwrap_or(""),
    ]
    .join(" ")
    .to_lowercase();
    contains_any(&haystack, AUTH_KEYWORDS)
}

fn is_verification_form(form: &FormInfo) -> bool {
    let haystack = [
        form.id.as_deref().unwrap_or(""),
        form.action.as_deref().unwrap_or(""),
        &form.classes.join(" "),
        form.aria_label.as_deref().unwrap_or(""),
        form.title.as_deref().unwrap_or(""),
    ]
    .join(" ")
    .to_lowercase();
    contains_any(&haystack, VERIFICATION_KEYWORDS)
}

fn field_haystack(field: &FieldInfo) -> String {
    [
        field.name.as_deref().unwrap_or(""),
        field.id.as_deref().unwrap_or(""),
        field.placeholder.as_deref().unwrap_or(""),
        field.aria_label.as_deref().unwrap_or(""),
        field.autocomplete.as_deref().unwrap_or(""),
    ]
    .join(" ")
    .to_lowercase()
}

fn is_text_like(input_type: Option<&str>) -> bool {
    matches!(input_type, None | Some("text") | Some("number") | Some(""))
}

fn detect_kind(field: &FieldInfo, form: &FormInfo) -> Option<SecretKind> {
    let input_type = field
        .input_type
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();
    let haystack = field_haystack(field);

    if input_type == "password" || contains_any(&haystack, PASSWORD_KEYWORDS) {
        return Some(SecretKind::Password);
    }
    if input_type == "email" || contains_any(&haystack, EMAIL_KEYWORDS) {
        return Some(SecretKind::Email);
    }
    if input_type == "tel" || contains_any(&haystack, PHONE_KEYWORDS) {
        return Some(SecretKind::Phone);
    }
    if is_text_like(field.input_type.as_deref())
        && contains_any(&haystack, VERIFICATION_KEYWORDS)
        && (matches!(field.max_length, Some(4..=8)) || is_verification_form(form))
    {
        return Some(SecretKind::Otp);
    }
    if contains_any(&haystack, TOKEN_KEYWORDS) {
        return Some(SecretKind::Token);
    }
    None
}

fn parameter_name(kind: SecretKind, field: &FieldInfo) -> String {
    let identity = [
        field.name.as_deref().unwrap_or(""),
        field.id.as_deref().unwrap_or(""),
    ]
    .join(" ")
    .to_lowercase();

    let suffix = if identity.contains("confirm") {
        "_confirm"
    } else if identity.contains("new") {
        "_new"
    } else if identity.contains("old") {
        "_old"
    } else {
        ""
    };
    format!("{}{}", kind.as_str(), suffix)
}

/// Decide whether an input value is a secret and the parameter name it binds
/// to. Outside an authentication form this always returns "not a secret",
/// regardless of field type.
pub fn classify(field: &FieldInfo, form: Option<&FormInfo>) -> Classification {
    let Some(form) = form else {
        return Classification::not_secret();
    };
    if !is_authentication_form(form) {
        return Classification::not_secret();
    }
    match detect_kind(field, form) {
        Some(kind) => Classification {
            is_secret: true,
            kind: Some(kind),
            parameter_name: Some(parameter_name(kind, field)),
        },
        None => Classification::not_secret(),
    }
}
