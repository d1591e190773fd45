use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::Receiver;

use admin_console::auth::{
    AuthError, ConsoleConfig, ErrorKind, Guarded, Role, Route, SessionEvent, UserRecord,
    navigation_for,
};
use admin_console::{ConsoleContext, init_logger};

#[derive(Parser, Debug)]
#[command(
    name = "admin-console",
    about = "Administrative console for the school-management backend"
)]
struct Args {
    /// Base URL of the backend API (overrides CONSOLE_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Credential file (overrides CONSOLE_CREDENTIALS_PATH).
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and remember the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show who is signed in.
    Whoami,
    /// List the screens available to the signed-in role.
    Nav,
    /// Open a screen through the access gate (e.g. `users`, `/fees`).
    Open { route: String },
    /// Fetch the signed-in user's profile from the backend.
    Profile,
    /// Create a console account.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// `admin` or `accountant`.
        #[arg(long, default_value = "accountant")]
        role: String,
    },
    /// Change the signed-in user's password.
    ChangePassword {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// Manage console accounts.
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
}

#[derive(Subcommand, Debug)]
enum UsersAction {
    List,
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let args = Args::parse();
    let mut config = ConsoleConfig::from_env()?;
    if let Some(url) = args.api_url {
        config = config.with_api_base_url(url);
    }
    if let Some(path) = args.credentials {
        config = config.with_credentials_path(path);
    }

    let context = ConsoleContext::from_config(config)?;
    let mut events = context.session.subscribe();

    let outcome = run(&context, args.command).await;
    report_events(&mut events)?;

    if let Err(err) = outcome {
        match err.kind() {
            // The redirect notice above already told the user what happened.
            ErrorKind::AuthExpired => {}
            kind => writeln!(io::stderr(), "error ({}): {}", kind.as_str(), err)?,
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(context: &ConsoleContext, command: Command) -> Result<(), AuthError> {
    let session = &context.session;
    let mut out = io::stdout().lock();

    match command {
        Command::Login { email, password } => {
            let user = session.login(&email, &password).await?;
            writeln!(out, "signed in as {} ({})", user.email, user.role)?;
        }
        Command::Logout => {
            if !session.is_authenticated() {
                writeln!(out, "not signed in")?;
            }
            session.logout();
        }
        Command::Whoami => match session.user() {
            Some(user) => print_user(&mut out, &user)?,
            None => writeln!(out, "not signed in")?,
        },
        Command::Nav => match session.user() {
            Some(user) => {
                for route in navigation_for(user.role) {
                    writeln!(out, "{:<10} {}", route.title(), route.path())?;
                }
            }
            None => writeln!(out, "{:<10} {}", Route::ENTRY.title(), Route::ENTRY.path())?,
        },
        Command::Open { route } => {
            let route = route.parse::<Route>().map_err(AuthError::Validation)?;
            open(context, &mut out, route).await?;
        }
        Command::Profile => open(context, &mut out, Route::Profile).await?,
        Command::Register {
            email,
            password,
            role,
        } => {
            let role = role
                .parse::<Role>()
                .map_err(|err| AuthError::Validation(err.to_string()))?;
            let response = session.api().register(&email, &password, role).await?;
            ensure_success(&response.message, response.success)?;
            writeln!(out, "registered {} as {}", email, role)?;
        }
        Command::ChangePassword { current, new } => {
            if new.len() < 6 {
                return Err(AuthError::Validation(
                    "New password must be at least 6 characters".into(),
                ));
            }
            let response = session.api().change_password(&current, &new).await?;
            ensure_success(&response.message, response.success)?;
            writeln!(out, "password changed")?;
        }
        Command::Users { action } => match action {
            UsersAction::List => open(context, &mut out, Route::Users).await?,
            UsersAction::Delete { id } => {
                if !guard_admits(&mut out, context, Route::Users)? {
                    return Ok(());
                }
                let response = session.api().delete_user(&id).await?;
                ensure_success(&response.message, response.success)?;
                writeln!(out, "deleted user {}", id)?;
            }
        },
    }

    Ok(())
}

/// Renders a screen the way the browser console would: gate first, then data.
async fn open(
    context: &ConsoleContext,
    out: &mut impl Write,
    route: Route,
) -> Result<(), AuthError> {
    if !guard_admits(out, context, route)? {
        return Ok(());
    }

    let api = context.session.api();
    match route {
        Route::Profile => {
            let response = api.profile().await?;
            ensure_success(&response.message, response.success)?;
            match response.data {
                Some(user) => print_user(out, &user)?,
                None => writeln!(out, "no profile returned")?,
            }
        }
        Route::Users => {
            let response = api.list_users().await?;
            ensure_success(&response.message, response.success)?;
            let users = response.data.unwrap_or_default();
            for user in &users {
                writeln!(out, "{:<8} {:<32} {}", user.id, user.email, user.role)?;
            }
            writeln!(out, "{} user(s)", users.len())?;
        }
        other => writeln!(out, "[{}] {}", other.path(), other.title())?,
    }

    Ok(())
}

fn guard_admits(
    out: &mut impl Write,
    context: &ConsoleContext,
    route: Route,
) -> Result<bool, AuthError> {
    if route.is_public() {
        return Ok(true);
    }

    match route.gate().guard(&context.session.snapshot(), || ()) {
        Guarded::Content(()) => Ok(true),
        Guarded::Loading => {
            writeln!(out, "loading...")?;
            Ok(false)
        }
        Guarded::Redirect { to, .. } => {
            writeln!(out, "not signed in; go to {}", to.path())?;
            Ok(false)
        }
        Guarded::AccessDenied => {
            writeln!(out, "access denied: {} requires an administrator", route.path())?;
            Ok(false)
        }
    }
}

fn ensure_success(message: &Option<String>, success: bool) -> Result<(), AuthError> {
    if success {
        Ok(())
    } else {
        Err(AuthError::request_failed(
            message.clone().unwrap_or_else(|| "Request failed".to_string()),
        ))
    }
}

fn print_user(out: &mut impl Write, user: &UserRecord) -> io::Result<()> {
    writeln!(out, "id:      {}", user.id)?;
    writeln!(out, "email:   {}", user.email)?;
    writeln!(out, "role:    {}", user.role)?;
    if let Some(created_at) = user.created_at {
        writeln!(out, "created: {}", created_at.format("%Y-%m-%d %H:%M UTC"))?;
    }
    Ok(())
}

fn report_events(events: &mut Receiver<SessionEvent>) -> io::Result<()> {
    let mut err = io::stderr();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::RedirectToEntry { reason } = event {
            writeln!(
                err,
                "session ended ({:?}); sign in again at {}",
                reason,
                Route::ENTRY.path()
            )?;
        }
    }
    Ok(())
}
