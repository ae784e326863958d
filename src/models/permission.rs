//! Permission codes and the identity attached to each request.

/// A capability a token can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    DronesRead,
    DronesWrite,
}

impl Permission {
    pub const ALL: [Permission; 2] = [Permission::DronesRead, Permission::DronesWrite];

    pub fn code(&self) -> &'static str {
        match self {
            Permission::DronesRead => "drones:read",
            Permission::DronesWrite => "drones:write",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Permission::ALL.into_iter().find(|p| p.code() == code)
    }
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    Token {
        name: String,
        permissions: Vec<Permission>,
    },
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn has(&self, permission: Permission) -> bool {
        match self {
            Principal::Anonymous => false,
            Principal::Token { permissions, .. } => permissions.contains(&permission),
        }
    }
}
