use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use common_auth::Role;
use sqlx::PgPool;
use storefront_service::PgCredentialStore;

#[derive(Parser, Debug)]
#[command(about = "Create storefront login accounts", long_about = None)]
struct Options {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a tenant-scoped account (tenant admin or customer)
    Tenant {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        email: String,
        #[arg(long = "full-name", default_value = "")]
        full_name: String,
        /// TENANT_ADMIN or CUSTOMER
        #[arg(long, default_value = "TENANT_ADMIN")]
        role: String,
        /// Falls back to SEED_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// Create a platform super admin
    SuperAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
}

fn resolve_password(flag: Option<String>) -> Result<String> {
    flag.or_else(|| std::env::var("SEED_PASSWORD").ok())
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| anyhow!("Provide --password or set SEED_PASSWORD"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Options::parse();
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set for seeding accounts")?;
    let pool = PgPool::connect(&database_url).await?;
    let store = PgCredentialStore::new(pool);

    match opts.command {
        Command::Tenant { tenant, email, full_name, role, password } => {
            let role: Role = role.parse().map_err(|err| anyhow!("Invalid --role: {err}"))?;
            let password = resolve_password(password)?;
            let id = store
                .create_tenant_account(&tenant, &email, &full_name, &password, role)
                .await?;
            println!("tenant {tenant}: created {role} account {id} for {email}");
        }
        Command::SuperAdmin { email, password } => {
            let password = resolve_password(password)?;
            let id = store.create_super_admin(&email, &password).await?;
            println!("created super admin {id} for {email}");
        }
    }
    Ok(())
}
