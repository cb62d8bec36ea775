/*!
Registered identities: students and admins.
*/
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Student,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Student => "Student",
            Role::Admin   => "Admin",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Student" => Ok(Role::Student),
            "Admin"   => Ok(Role::Admin),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

/**
A full account row, password digest included.

This only ever travels between the store and the auth engine; anything
that goes out over the wire is an `AccountProfile` instead.
*/
#[derive(Clone, Debug)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub pwhash: String,
    pub role: Role,
}

/// What a client is allowed to see of an account, plus the names of the
/// courses it is enrolled in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub courses: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [Role::Student, Role::Admin] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(role, parsed);
        }

        assert!("Boss".parse::<Role>().is_err());
        assert!("student".parse::<Role>().is_err());
    }
}
