use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use quartermaster::authz::{csv, features, AuthzService, NewFeatureFlag, Permission};
use quartermaster::{settings, storage};
use sea_orm::DatabaseConnection;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "quartermaster", version, about = "RBAC policy store administration")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Install the default role set
    Bootstrap {
        /// Replace existing rules instead of skipping a populated store
        #[arg(long)]
        force: bool,
    },
    /// Write every policy rule as CSV lines
    Export {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Add the rules of a CSV policy file in one transaction
    Import { file: PathBuf },
    /// List known roles
    Roles,
    /// Inspect, create or delete a role
    #[command(subcommand)]
    Role(RoleCommand),
    /// Grant a role to a user
    Assign { user: String, role: String },
    /// Revoke a role from a user
    Unassign { user: String, role: String },
    /// Manage feature flags
    #[command(subcommand)]
    Feature(FeatureCommand),
}

#[derive(Subcommand, Debug)]
enum RoleCommand {
    /// Show the permissions and members of a role
    Show { role: String },
    /// Create a role from `resource:action[:domain]` permissions
    Create {
        role: String,
        #[arg(required = true, value_parser = parse_permission)]
        permissions: Vec<Permission>,
    },
    /// Delete a role, its permissions and its memberships
    Delete { role: String },
}

#[derive(Subcommand, Debug)]
enum FeatureCommand {
    /// Create or replace a feature flag
    Set {
        name: String,
        #[arg(long)]
        enabled: bool,
        #[arg(long)]
        public: bool,
        /// Role allowed to use the feature (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Check whether a feature is enabled, or accessible to a user
    Check {
        name: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// List feature flags
    List,
    /// Delete a feature flag
    Delete { name: String },
}

fn parse_permission(s: &str) -> std::result::Result<Permission, String> {
    Permission::parse(s).ok_or_else(|| format!("expected resource:action[:domain], got `{s}`"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database); `migrate` applies the schema itself
    let db = match cli.command {
        Command::Migrate => storage::connect(&settings.database).await?,
        _ => storage::init(&settings.database).await?,
    };
    let authz = AuthzService::new(db.clone());

    if settings.policy.bootstrap_if_empty && !matches!(cli.command, Command::Migrate) {
        let installed = authz.bootstrap_if_empty().await?;
        if installed > 0 {
            tracing::info!(rules = installed, "Bootstrapped empty policy store");
        }
    }

    run(cli.command, &db, &authz).await
}

async fn run(command: Command, db: &DatabaseConnection, authz: &AuthzService) -> Result<()> {
    match command {
        Command::Migrate => {
            let applied = storage::migrate(db).await?;
            println!("{applied} migration(s) applied");
        }
        Command::Bootstrap { force } => {
            let written = if force {
                authz.roles.import_default_policies().await?
            } else {
                authz.bootstrap_if_empty().await?
            };
            println!("{written} rule(s) written");
        }
        Command::Export { output } => match output {
            Some(path) => {
                let count = csv::export_to_file(authz.adapter.as_ref(), &path).await?;
                println!("{count} rule(s) written to {}", path.display());
            }
            None => print!("{}", csv::export_to_csv(authz.adapter.as_ref()).await?),
        },
        Command::Import { file } => {
            let count = csv::import_from_file(authz.adapter.as_ref(), &file).await?;
            println!("{count} rule(s) imported");
        }
        Command::Roles => {
            for role in authz.roles.list_roles().await? {
                println!("{role}");
            }
        }
        Command::Role(RoleCommand::Show { role }) => {
            let permissions = authz.roles.get_permissions_for_role(&role).await?;
            if permissions.is_empty() {
                return Err(miette::miette!("role `{role}` does not exist"));
            }
            println!("role: {role}");
            for permission in permissions {
                println!("  permission: {permission}");
            }
            for user in authz.roles.get_users_for_role(&role).await? {
                println!("  member: {user}");
            }
        }
        Command::Role(RoleCommand::Create { role, permissions }) => {
            authz.roles.create_role(&role, &permissions).await?;
            println!("created role `{role}` with {} permission(s)", permissions.len());
        }
        Command::Role(RoleCommand::Delete { role }) => {
            let removed = authz.roles.delete_role(&role).await?;
            println!("{removed} rule(s) removed");
        }
        Command::Assign { user, role } => {
            if authz.roles.assign_role_to_user(&user, &role).await? {
                println!("assigned `{role}` to `{user}`");
            } else {
                println!("`{user}` already holds `{role}`");
            }
        }
        Command::Unassign { user, role } => {
            if authz.roles.remove_role_from_user(&user, &role).await? {
                println!("removed `{role}` from `{user}`");
            } else {
                println!("`{user}` does not hold `{role}`");
            }
        }
        Command::Feature(command) => run_feature(command, db, authz).await?,
    }
    Ok(())
}

async fn run_feature(
    command: FeatureCommand,
    db: &DatabaseConnection,
    authz: &AuthzService,
) -> Result<()> {
    match command {
        FeatureCommand::Set {
            name,
            enabled,
            public,
            roles,
            description,
        } => {
            let flag = features::upsert_feature_flag(
                db,
                NewFeatureFlag {
                    name,
                    description,
                    enabled,
                    public,
                    allowed_roles: roles,
                },
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&flag).into_diagnostic()?);
        }
        FeatureCommand::Check { name, user } => {
            let allowed = match user {
                Some(user) => authz.features.can_access_feature(&user, &name).await?,
                None => authz.features.is_feature_enabled(&name).await?,
            };
            println!("{allowed}");
        }
        FeatureCommand::List => {
            let flags = features::list_feature_flags(db).await?;
            println!("{}", serde_json::to_string_pretty(&flags).into_diagnostic()?);
        }
        FeatureCommand::Delete { name } => {
            if features::delete_feature_flag(db, &name).await? {
                println!("deleted `{name}`");
            } else {
                println!("no feature flag named `{name}`");
            }
        }
    }
    Ok(())
}
