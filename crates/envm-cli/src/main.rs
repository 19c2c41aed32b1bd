//! `envm` CLI: command-line client for the envm server.
//!
//! Keeps the session in a machine-bound encrypted vault under `~/.envm/`,
//! links working directories to projects through `envm.json`, and syncs
//! `.env*` files with the server.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod client;
mod dotenv;
mod machine;
mod project;
mod vault;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use crate::client::{ApiClient, Variable};
use crate::project::{CONFIG_FILE, ProjectConfig};
use crate::vault::{CredentialVault, Credentials};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// envm: share .env files through an encrypted, access-controlled server.
#[derive(Parser)]
#[command(
    name = "envm",
    version,
    about = "envm CLI: sync .env files with your team's envm server",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         ENVM_API_URL    Server address (default: http://127.0.0.1:8080)\n  \
         ENVM_PASSWORD   Password for register/login\n\n\
         {DIM}Examples:{RESET}\n  \
         envm login --email me@example.com\n  \
         envm init --org <org-id>\n  \
         envm load\n  \
         envm push\n  \
         envm pull"
    ),
)]
struct Cli {
    /// envm server address.
    #[arg(long, env = "ENVM_API_URL", default_value = "http://127.0.0.1:8080", global = true)]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account.
    Register {
        #[arg(long)]
        email: String,
        /// Display name.
        #[arg(long)]
        name: String,
        #[arg(long, env = "ENVM_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log in and store the session in the local vault.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "ENVM_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// End the session and remove local credentials.
    Logout,
    /// Show the logged-in user.
    Whoami,
    /// Request a password-reset token by email.
    #[command(name = "forgot-password")]
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Set a new password using a reset token.
    #[command(name = "reset-password")]
    ResetPassword {
        #[arg(long)]
        token: String,
        #[arg(long, env = "ENVM_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Your account.
    Users {
        #[command(subcommand)]
        action: UserCommands,
    },
    /// Organization operations.
    #[command(alias = "org")]
    Orgs {
        #[command(subcommand)]
        action: OrgCommands,
    },
    /// Project operations.
    #[command(alias = "project")]
    Projects {
        #[command(subcommand)]
        action: ProjectCommands,
    },
    /// Environment operations.
    #[command(alias = "env")]
    Envs {
        #[command(subcommand)]
        action: EnvCommands,
    },
    /// Link the current directory to a project (writes envm.json).
    Init {
        /// Organization to create the project in (default: your only organization).
        #[arg(long)]
        org: Option<String>,
        /// Link an existing project instead of creating one.
        #[arg(long, conflicts_with = "org")]
        project: Option<String>,
        /// Name for the new project (default: current directory name).
        #[arg(long)]
        name: Option<String>,
        /// Overwrite an existing envm.json.
        #[arg(long, default_value = "false")]
        force: bool,
    },
    /// Scan for new .env files and record them in envm.json.
    Load,
    /// Write the project's variables to their .env files.
    Pull,
    /// Upload local .env files, creating missing environments.
    Push,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Show your profile as the server has it.
    Me,
    /// Change your email or display name.
    Update {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete your account and local credentials.
    Delete {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum OrgCommands {
    /// List your organizations.
    List,
    /// Create an organization (you become its owner).
    Create {
        name: String,
        #[arg(long)]
        slug: Option<String>,
    },
    /// Show one organization.
    Get { id: String },
    /// Rename an organization or change its slug.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        slug: Option<String>,
    },
    /// Delete an organization with all its projects.
    Delete {
        id: String,
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Accept an invitation token.
    Join { token: String },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// List projects you belong to, or all visible projects of an organization.
    List {
        #[arg(long)]
        org: Option<String>,
    },
    /// Create a project in an organization.
    Create {
        name: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Show one project.
    Get { id: String },
    /// Change a project's name, slug, or description.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        slug: Option<String>,
        /// An empty string clears the description.
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a project with its environments and variables.
    Delete {
        id: String,
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum EnvCommands {
    /// List environments of a project (default: the linked project).
    List {
        #[arg(long)]
        project: Option<String>,
    },
    /// Create an environment (default project: the linked one).
    Create {
        name: String,
        #[arg(long)]
        project: Option<String>,
    },
    /// Show one environment.
    Get { id: String },
    /// Rename an environment or change its slug.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        slug: Option<String>,
    },
    /// Delete an environment with its variables.
    Delete {
        id: String,
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli.api_url, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(api_url: &str, cmd: Commands) -> Result<()> {
    if let Some(what) = unconfirmed_delete(&cmd) {
        bail!("refusing to delete {what} without --yes");
    }
    match cmd {
        Commands::Register {
            email,
            name,
            password,
        } => cmd_register(api_url, &email, &name, &password).await,
        Commands::Login { email, password } => cmd_login(api_url, &email, &password).await,
        Commands::Logout => cmd_logout(api_url).await,
        Commands::Whoami => cmd_whoami(api_url),
        Commands::ForgotPassword { email } => {
            let ack = ApiClient::new(api_url).forgot_password(&email).await?;
            success(&ack);
            Ok(())
        }
        Commands::ResetPassword { token, password } => {
            let ack = ApiClient::new(api_url)
                .reset_password(&token, &password)
                .await?;
            success(&ack);
            println!("  {DIM}All sessions were signed out. Run `envm login` with the new password.{RESET}");
            Ok(())
        }
        Commands::Users { action } => cmd_users(api_url, action).await,
        Commands::Orgs { action } => cmd_orgs(api_url, action).await,
        Commands::Projects { action } => cmd_projects(api_url, action).await,
        Commands::Envs { action } => cmd_envs(api_url, action).await,
        Commands::Init {
            org,
            project,
            name,
            force,
        } => cmd_init(api_url, org, project, name, force).await,
        Commands::Load => cmd_load(),
        Commands::Pull => cmd_pull(api_url).await,
        Commands::Push => cmd_push(api_url).await,
    }
}

/// Load the vault session, rotate its refresh token, and return an
/// authenticated client.
async fn session(api_url: &str) -> Result<(ApiClient, Credentials)> {
    let vault = CredentialVault::open_default()?;
    let stored = vault
        .load()?
        .ok_or_else(|| anyhow::anyhow!("not logged in; run `envm login` first"))?;

    let client = ApiClient::new(api_url);
    let session = client
        .refresh(&stored.token)
        .await
        .context("session expired; run `envm login` again")?;

    let credentials = Credentials {
        token: session.refresh_token,
        ..stored
    };
    vault.save(&credentials)?;
    Ok((client.with_access_token(session.access_token), credentials))
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("failed to get current directory")
}

/// What a delete command would remove, when it lacks `--yes`.
fn unconfirmed_delete(cmd: &Commands) -> Option<&'static str> {
    match cmd {
        Commands::Users {
            action: UserCommands::Delete { yes: false },
        } => Some("your account"),
        Commands::Orgs {
            action: OrgCommands::Delete { yes: false, .. },
        } => Some("the organization"),
        Commands::Projects {
            action: ProjectCommands::Delete { yes: false, .. },
        } => Some("the project"),
        Commands::Envs {
            action: EnvCommands::Delete { yes: false, .. },
        } => Some("the environment"),
        _ => None,
    }
}

/// `--project` if given, otherwise the project linked by `envm.json`.
fn project_or_linked(project: Option<String>) -> Result<String> {
    match project {
        Some(project) => Ok(project),
        None => Ok(ProjectConfig::load(&current_dir()?)?.project_id),
    }
}

// ── Account commands ─────────────────────────────────────────────────

async fn cmd_register(api_url: &str, email: &str, name: &str, password: &str) -> Result<()> {
    let user = ApiClient::new(api_url)
        .register(email, password, name)
        .await?;
    success(&format!("Account created for {}", user.email));
    println!("  {DIM}Run `envm login --email {}` to start a session.{RESET}", user.email);
    Ok(())
}

async fn cmd_login(api_url: &str, email: &str, password: &str) -> Result<()> {
    let session = ApiClient::new(api_url).login(email, password).await?;

    let vault = CredentialVault::open_default()?;
    vault.save(&Credentials {
        token: session.refresh_token,
        user_id: session.user.id,
        email: session.user.email.clone(),
        full_name: session.user.full_name,
    })?;

    success(&format!("Logged in as {}", session.user.email));
    println!("  {DIM}Credentials stored in {}{RESET}", vault.path().display());
    Ok(())
}

async fn cmd_logout(api_url: &str) -> Result<()> {
    let vault = CredentialVault::open_default()?;
    match vault.load() {
        Ok(Some(credentials)) => {
            if let Err(e) = ApiClient::new(api_url).logout(&credentials.token).await {
                warning(&format!("server logout failed ({e:#}); removing local credentials anyway"));
            }
        }
        Ok(None) => {
            success("Already logged out");
            return Ok(());
        }
        Err(e) => warning(&format!("{e}; removing it")),
    }

    vault.clear()?;
    success("Logged out");
    Ok(())
}

fn cmd_whoami(api_url: &str) -> Result<()> {
    let credentials = CredentialVault::open_default()?
        .load()?
        .ok_or_else(|| anyhow::anyhow!("not logged in; run `envm login` first"))?;

    header("●", "Current session");
    kv_line("Email", &credentials.email);
    kv_line("Name", &credentials.full_name);
    kv_line("User ID", &credentials.user_id);
    kv_line("Server", api_url);
    Ok(())
}

async fn cmd_users(api_url: &str, action: UserCommands) -> Result<()> {
    let (client, credentials) = session(api_url).await?;
    match action {
        UserCommands::Me => {
            let user = client.me().await?;
            header("●", "Profile");
            kv_line("Email", &user.email);
            kv_line("Name", &user.full_name);
            kv_line("User ID", &user.id);
        }
        UserCommands::Update { email, name } => {
            if email.is_none() && name.is_none() {
                bail!("nothing to update; pass --email and/or --name");
            }
            let user = client.update_me(email.as_deref(), name.as_deref()).await?;
            CredentialVault::open_default()?.save(&Credentials {
                email: user.email.clone(),
                full_name: user.full_name.clone(),
                ..credentials
            })?;
            success(&format!("Profile updated ({})", user.email));
        }
        UserCommands::Delete { .. } => {
            client.delete_me().await?;
            CredentialVault::open_default()?.clear()?;
            success(&format!("Account {} deleted", credentials.email));
        }
    }
    Ok(())
}

// ── Organization & project commands ──────────────────────────────────

async fn cmd_orgs(api_url: &str, action: OrgCommands) -> Result<()> {
    let (client, _) = session(api_url).await?;
    match action {
        OrgCommands::List => {
            let orgs = client.list_orgs().await?;
            header("◆", "Organizations");
            if orgs.is_empty() {
                println!("  {DIM}(none){RESET}");
            }
            for org in orgs {
                println!("  {WHITE}{:<24}{RESET} {DIM}{:<20} {}{RESET}", org.name, org.slug, org.id);
            }
        }
        OrgCommands::Create { name, slug } => {
            let org = client.create_org(&name, slug.as_deref()).await?;
            success(&format!("Organization '{}' created", org.name));
            kv_line("ID", &org.id);
            kv_line("Slug", &org.slug);
        }
        OrgCommands::Get { id } => {
            let org = client.get_org(&id).await?;
            header("◆", &org.name);
            kv_line("ID", &org.id);
            kv_line("Slug", &org.slug);
        }
        OrgCommands::Update { id, name, slug } => {
            let org = client
                .update_org(&id, name.as_deref(), slug.as_deref())
                .await?;
            success(&format!("Organization '{}' updated", org.name));
            kv_line("Slug", &org.slug);
        }
        OrgCommands::Delete { id, .. } => {
            client.delete_org(&id).await?;
            success(&format!("Organization {id} deleted"));
        }
        OrgCommands::Join { token } => {
            let membership = client.accept_invitation(&token).await?;
            let role = membership
                .get("role")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("member");
            success(&format!("Joined organization as {role}"));
        }
    }
    Ok(())
}

async fn cmd_projects(api_url: &str, action: ProjectCommands) -> Result<()> {
    let (client, _) = session(api_url).await?;
    match action {
        ProjectCommands::List { org } => {
            let projects = client.list_projects(org.as_deref()).await?;
            header("◆", "Projects");
            if projects.is_empty() {
                println!("  {DIM}(none){RESET}");
            }
            for p in projects {
                println!(
                    "  {WHITE}{:<24}{RESET} {DIM}{:<20} {} (org {}){RESET}",
                    p.name, p.slug, p.id, p.organization_id
                );
            }
        }
        ProjectCommands::Create {
            name,
            org,
            description,
        } => {
            let project = client
                .create_project(&org, &name, description.as_deref())
                .await?;
            success(&format!("Project '{}' created", project.name));
            kv_line("ID", &project.id);
            kv_line("Slug", &project.slug);
        }
        ProjectCommands::Get { id } => {
            let project = client.get_project(&id).await?;
            header("◆", &project.name);
            kv_line("ID", &project.id);
            kv_line("Slug", &project.slug);
            kv_line("Organization", &project.organization_id);
            if let Some(description) = &project.description {
                kv_line("Description", description);
            }
        }
        ProjectCommands::Update {
            id,
            name,
            slug,
            description,
        } => {
            let project = client
                .update_project(&id, name.as_deref(), slug.as_deref(), description.as_deref())
                .await?;
            success(&format!("Project '{}' updated", project.name));
            kv_line("Slug", &project.slug);
        }
        ProjectCommands::Delete { id, .. } => {
            client.delete_project(&id).await?;
            success(&format!("Project {id} deleted"));
        }
    }
    Ok(())
}

async fn cmd_envs(api_url: &str, action: EnvCommands) -> Result<()> {
    // Resolve the linked project before touching the session.
    let action = match action {
        EnvCommands::List { project } => EnvCommands::List {
            project: Some(project_or_linked(project)?),
        },
        EnvCommands::Create { name, project } => EnvCommands::Create {
            name,
            project: Some(project_or_linked(project)?),
        },
        other => other,
    };

    let (client, _) = session(api_url).await?;
    match action {
        EnvCommands::List { project } => {
            let project = project.unwrap_or_default();
            let environments = client.list_environments(&project).await?;
            header("◆", "Environments");
            if environments.is_empty() {
                println!("  {DIM}(none){RESET}");
            }
            for env in environments {
                println!("  {WHITE}{:<24}{RESET} {DIM}{:<20} {}{RESET}", env.name, env.slug, env.id);
            }
        }
        EnvCommands::Create { name, project } => {
            let project = project.unwrap_or_default();
            let env = client.create_environment(&project, &name).await?;
            success(&format!("Environment '{}' created", env.name));
            kv_line("ID", &env.id);
            kv_line("Slug", &env.slug);
        }
        EnvCommands::Get { id } => {
            let env = client.get_environment(&id).await?;
            header("◆", &env.name);
            kv_line("ID", &env.id);
            kv_line("Slug", &env.slug);
            kv_line("Project", &env.project_id);
        }
        EnvCommands::Update { id, name, slug } => {
            let env = client
                .update_environment(&id, name.as_deref(), slug.as_deref())
                .await?;
            success(&format!("Environment '{}' updated", env.name));
            kv_line("Slug", &env.slug);
        }
        EnvCommands::Delete { id, .. } => {
            client.delete_environment(&id).await?;
            success(&format!("Environment {id} deleted"));
        }
    }
    Ok(())
}

// ── Directory sync commands ──────────────────────────────────────────

fn directory_name(dir: &Path) -> String {
    dir.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("default")
        .to_owned()
}

async fn cmd_init(
    api_url: &str,
    org: Option<String>,
    project_id: Option<String>,
    name: Option<String>,
    force: bool,
) -> Result<()> {
    let cwd = current_dir()?;
    if cwd.join(CONFIG_FILE).exists() && !force {
        bail!("{CONFIG_FILE} already exists; pass --force to relink this directory");
    }

    let (client, credentials) = session(api_url).await?;

    let project = if let Some(project_id) = project_id {
        client.get_project(&project_id).await?
    } else {
        let org_id = match org {
            Some(org_id) => org_id,
            None => {
                let orgs = client.list_orgs().await?;
                match orgs.as_slice() {
                    [] => {
                        let org = client.create_org(&credentials.full_name, None).await?;
                        success(&format!("Organization '{}' created", org.name));
                        org.id
                    }
                    [only] => only.id.clone(),
                    _ => bail!("you belong to several organizations; pass --org <id> (see `envm orgs list`)"),
                }
            }
        };
        let name = name.unwrap_or_else(|| directory_name(&cwd));
        let project = client
            .create_project(&org_id, &name, Some("Created via CLI"))
            .await?;
        success(&format!("Project '{}' created", project.name));
        project
    };

    let environments = dotenv::scan(&cwd).context("failed to scan for .env files")?;
    let config = ProjectConfig {
        organization_id: project.organization_id.clone(),
        project_id: project.id.clone(),
        environments,
    };
    config.save(&cwd)?;

    success(&format!("Linked this directory to '{}'", project.name));
    for env in &config.environments {
        kv_line(&env.name, &env.path);
    }
    println!("  {DIM}Run `envm push` to upload these files.{RESET}");
    Ok(())
}

fn cmd_load() -> Result<()> {
    let cwd = current_dir()?;
    let found = dotenv::scan(&cwd).context("failed to scan for .env files")?;
    if found.is_empty() {
        success("No .env files found");
        return Ok(());
    }

    if !cwd.join(CONFIG_FILE).exists() {
        header("◆", "Found .env files");
        for file in &found {
            kv_line(&file.name, &file.path);
        }
        println!("  {DIM}Run `envm init --org <org-id>` to link this directory.{RESET}");
        return Ok(());
    }

    let mut config = ProjectConfig::load(&cwd)?;
    let known: HashSet<String> = config.environments.iter().map(|e| e.path.clone()).collect();
    let added: Vec<_> = found
        .into_iter()
        .filter(|file| !known.contains(&file.path))
        .collect();
    if added.is_empty() {
        success(&format!("{CONFIG_FILE} already lists every .env file"));
        return Ok(());
    }

    for file in &added {
        println!("  {GREEN}+{RESET} {} {DIM}({}){RESET}", file.name, file.path);
    }
    config.environments.extend(added);
    config.environments.sort_by(|a, b| a.path.cmp(&b.path));
    config.save(&cwd)?;
    success(&format!("Updated {CONFIG_FILE}; run `envm push` to upload"));
    Ok(())
}

/// A key that two environments both write into the same file.
#[derive(Debug, PartialEq, Eq)]
struct Collision {
    path: String,
    key: String,
    kept: String,
    dropped: String,
}

/// Group variables by the file they belong in. When several environments
/// define the same key for one file, the first environment wins.
fn group_by_path(
    environments: Vec<(String, Vec<Variable>)>,
) -> (BTreeMap<String, Vec<Variable>>, Vec<Collision>) {
    let mut files: BTreeMap<String, Vec<Variable>> = BTreeMap::new();
    let mut writers: HashMap<(String, String), String> = HashMap::new();
    let mut collisions = Vec::new();

    for (env_name, variables) in environments {
        for variable in variables {
            let slot = (variable.path.clone(), variable.key.clone());
            if let Some(kept) = writers.get(&slot) {
                collisions.push(Collision {
                    path: slot.0,
                    key: slot.1,
                    kept: kept.clone(),
                    dropped: env_name.clone(),
                });
                continue;
            }
            writers.insert(slot, env_name.clone());
            files.entry(variable.path.clone()).or_default().push(variable);
        }
    }
    (files, collisions)
}

async fn cmd_pull(api_url: &str) -> Result<()> {
    let cwd = current_dir()?;
    let config = ProjectConfig::load(&cwd)?;
    let (client, _) = session(api_url).await?;

    let mut environments = Vec::new();
    for env in client.list_environments(&config.project_id).await? {
        let variables = client.list_variables(&env.id).await?;
        println!("  {DIM}{}: {} variables{RESET}", env.name, variables.len());
        environments.push((env.name, variables));
    }

    let (files, collisions) = group_by_path(environments);
    for c in &collisions {
        warning(&format!(
            "{} in {} is set by both '{}' and '{}'; keeping '{}'",
            c.key, c.path, c.kept, c.dropped, c.kept
        ));
    }

    if files.is_empty() {
        success("Nothing to pull");
        return Ok(());
    }

    for (path, variables) in &files {
        if !dotenv::is_safe_relative(path) {
            warning(&format!("skipping unsafe path '{path}'"));
            continue;
        }
        let target = cwd.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = dotenv::render(variables.iter().map(|v| (v.key.as_str(), v.value.as_str())));
        fs::write(&target, content).with_context(|| format!("failed to write {}", target.display()))?;
        success(&format!("Wrote {path} ({} variables)", variables.len()));
    }
    Ok(())
}

async fn cmd_push(api_url: &str) -> Result<()> {
    let cwd = current_dir()?;
    let config = ProjectConfig::load(&cwd)?;
    let files = dotenv::scan(&cwd).context("failed to scan for .env files")?;
    if files.is_empty() {
        success("No .env files found to push");
        return Ok(());
    }

    let (client, _) = session(api_url).await?;
    let mut remote: HashMap<String, String> = HashMap::new();
    for env in client.list_environments(&config.project_id).await? {
        remote.insert(env.slug, env.id.clone());
        remote.insert(env.name, env.id);
    }

    let mut failures = 0usize;
    for file in files {
        header("↑", &format!("{} ({})", file.name, file.path));
        let content = fs::read_to_string(cwd.join(&file.path))
            .with_context(|| format!("failed to read {}", file.path))?;

        let env_id = if let Some(id) = remote.get(&file.name) {
            id.clone()
        } else {
            let env = client
                .create_environment(&config.project_id, &file.name)
                .await?;
            success(&format!("Created environment '{}'", env.name));
            remote.insert(env.name.clone(), env.id.clone());
            env.id
        };

        let existing: HashSet<String> = client
            .list_variables(&env_id)
            .await?
            .into_iter()
            .map(|v| v.key)
            .collect();

        for (key, value) in dotenv::parse(&content) {
            let result = if existing.contains(&key) {
                client.update_variable(&env_id, &key, &value, &file.path).await
            } else {
                client.create_variable(&env_id, &key, &value, &file.path).await
            };
            match result {
                Ok(_) if existing.contains(&key) => println!("  {DIM}updated{RESET} {key}"),
                Ok(_) => println!("  {GREEN}created{RESET} {key}"),
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warning(&format!("{key}: {e:#}"));
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} variable(s) failed to push");
    }
    success("Push complete");
    Ok(())
}
