/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::{
    auth::{self, Auth, AuthConfig},
    store::Store,
};

#[derive(Deserialize)]
struct ConfigFile {
    db_connect_string: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    token_secret: Option<String>,
    token_lifetime_secs: Option<i64>,
    admin_reg_code: Option<String>,
    admin_name: Option<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Cfg {
    pub db_connect_string: String,
    pub addr: SocketAddr,
    pub token_secret: String,
    pub token_lifetime_secs: i64,
    pub admin_reg_code: String,
    pub default_admin_name: String,
    pub default_admin_email: String,
    pub default_admin_password: String,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_connect_string: "host=localhost user=matric_test password='matric_test' dbname=matric_test".to_owned(),
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                8001
            ),
            token_secret: "dev-only-signing-secret-set-a-real-one-in-matric.toml".to_owned(),
            token_lifetime_secs: 2 * 60 * 60,
            admin_reg_code: "ADMIN2024".to_owned(),
            default_admin_name: "Administrator".to_owned(),
            default_admin_email: "admin@matric.test".to_owned(),
            default_admin_password: "toot".to_owned(),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_connect_string {
            c.db_connect_string = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.token_secret {
            c.token_secret = s;
        }
        if let Some(n) = cf.token_lifetime_secs {
            c.token_lifetime_secs = n;
        }
        if let Some(s) = cf.admin_reg_code {
            c.admin_reg_code = s;
        }
        if let Some(s) = cf.admin_name {
            c.default_admin_name = s;
        }
        if let Some(s) = cf.admin_email {
            c.default_admin_email = s;
        }
        if let Some(s) = cf.admin_password {
            c.default_admin_password = s;
        }

        Ok(c)
    }
}

/**
This guy hauls around the shared state and gets passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    pub store: Store,
    pub auth: Auth,
    pub addr: SocketAddr,
}

/// Loads system configuration and ensures all appropriate database
/// tables exist.
///
/// Also assures existence of the default admin and, on a completely
/// fresh database, the starter catalog.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let path = path.as_ref();
    let cfg = if path.exists() {
        Cfg::from_file(path)?
    } else {
        log::warn!(
            "Config file {} not found; using default configuration.",
            path.display()
        );
        Cfg::default()
    };
    log::info!("Configuration loaded:\n{:#?}", &cfg);

    log::trace!("Checking state of data DB...");
    let store = Store::new(cfg.db_connect_string.clone());
    if let Err(e) = store.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    log::trace!("Checking existence of default Admin...");
    match store.email_exists(&cfg.default_admin_email).await {
        Err(e) => {
            let estr = format!(
                "Error attempting to check existence of default Admin ({}): {}",
                &cfg.default_admin_email, &e
            );
            return Err(estr);
        },
        Ok(false) => {
            log::info!(
                "Default Admin ({}) doesn't exist; inserting.",
                &cfg.default_admin_email
            );
            if let Err(e) = store.insert_account(
                &cfg.default_admin_name,
                &cfg.default_admin_email,
                &auth::hash_password(&cfg.default_admin_password),
                crate::account::Role::Admin,
            ).await {
                let estr = format!(
                    "Error inserting default Admin: {}", &e
                );
                return Err(estr);
            }
        },
        Ok(true) => {
            log::trace!("Default Admin OK.");
        },
    }

    log::trace!("Checking starter catalog...");
    if let Err(e) = store.ensure_seed_catalog().await {
        let estr = format!("Error seeding starter catalog: {}", &e);
        return Err(estr);
    }

    let auth = Auth::new(AuthConfig {
        token_secret: cfg.token_secret,
        token_lifetime_secs: cfg.token_lifetime_secs,
        admin_reg_code: cfg.admin_reg_code,
    });

    let glob = Glob {
        store,
        auth,
        addr: cfg.addr,
    };

    Ok(glob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_folds_over_defaults() {
        let path = std::env::temp_dir().join("matric_cfg_test.toml");
        std::fs::write(
            &path,
            r#"
port = 9090
token_secret = "file-secret"
admin_reg_code = "SESAME"
"#,
        ).unwrap();

        let cfg = Cfg::from_file(&path).unwrap();
        let dflt = Cfg::default();

        assert_eq!(cfg.addr.port(), 9090);
        assert_eq!(cfg.addr.ip(), dflt.addr.ip());
        assert_eq!(cfg.token_secret.as_str(), "file-secret");
        assert_eq!(cfg.admin_reg_code.as_str(), "SESAME");
        assert_eq!(cfg.db_connect_string, dflt.db_connect_string);
        assert_eq!(cfg.token_lifetime_secs, 7200);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unreadable_config_errors() {
        assert!(Cfg::from_file("/no/such/file/anywhere.toml").is_err());
    }
}
