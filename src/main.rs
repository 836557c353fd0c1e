mod api;
mod config;
mod connect;
mod logging;
mod phone;
mod ui;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use api::{
    ConnectionCandidate, ConnectionStatus, ConnectionsApi, EditingContact, ExternalContactDraft,
    HttpApi, NewConnection,
};
use config::Config;
use connect::form::{submit_error_message, FormBlocked};
use connect::modal::SubmitOutcome;
use connect::search::{is_searchable, search_error_message, SearchResolver};
use connect::{ConnectionModal, ContactField, ContactForm, FieldErrors, RelationshipSelector};

#[derive(Parser, Debug)]
#[command(name = "kinlink", version, about = "Manage your care circle connections")]
struct Cli {
    /// Use this configuration file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up registered users by name or email
    Search(SearchArgs),
    /// Show linked connections and external contacts
    List,
    /// Connect with a registered user
    Link(LinkArgs),
    /// Save a contact who is not a registered user
    AddExternal(ContactArgs),
    /// Change the relationship of a linked connection
    EditLinked(EditLinkedArgs),
    /// Update an external contact
    EditExternal(EditExternalArgs),
    /// Remove a connection or external contact
    Delete(DeleteArgs),
    /// Check contact details without saving them
    Validate(ValidateArgs),
    /// List the relationship types
    Relationships,
}

#[derive(Args, Debug)]
struct SearchArgs {
    query: String,
}

#[derive(Args, Debug)]
struct LinkArgs {
    #[arg(value_name = "USER_ID")]
    user_id: String,
    #[arg(long)]
    relationship: String,
}

#[derive(Args, Debug)]
struct ContactArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    relationship: String,
}

impl ContactArgs {
    fn into_draft(self) -> ExternalContactDraft {
        ExternalContactDraft {
            name: self.name,
            phone: self.phone,
            address: self.address,
            relationship: self.relationship,
        }
    }
}

#[derive(Args, Debug)]
struct EditLinkedArgs {
    #[arg(value_name = "CONNECTION_ID")]
    id: String,
    #[arg(long)]
    relationship: String,
}

#[derive(Args, Debug)]
struct EditExternalArgs {
    #[arg(value_name = "CONTACT_ID")]
    id: String,
    #[command(flatten)]
    contact: ContactArgs,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    #[arg(value_name = "ID")]
    id: String,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    phone: String,
    #[arg(long)]
    address: Option<String>,
    #[arg(long, default_value = "")]
    relationship: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let Some(command) = cli.command else {
        return run_tui(cli.config.as_deref());
    };

    logging::init_stderr()?;

    // Offline commands never touch the configuration's required fields
    match command {
        Command::Validate(args) => return handle_validate(args),
        Command::Relationships => return handle_relationships(cli.config.as_deref()),
        _ => {}
    }

    let config = config::load(cli.config.as_deref())?;
    let api = HttpApi::new(&config.api)?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    runtime.block_on(async {
        match command {
            Command::Search(args) => handle_search(&api, &config, args).await,
            Command::List => handle_list(&api, &config).await,
            Command::Link(args) => handle_link(api, &config, args).await,
            Command::AddExternal(args) => handle_add_external(&api, args).await,
            Command::EditLinked(args) => handle_edit_linked(api, &config, args).await,
            Command::EditExternal(args) => handle_edit_external(api, &config, args).await,
            Command::Delete(args) => handle_delete(&api, args).await,
            Command::Validate(_) | Command::Relationships => Ok(()),
        }
    })
}

fn run_tui(config_path: Option<&Path>) -> Result<()> {
    let config = config::load(config_path)?;
    let _log_guard = logging::init_file(&config.log.file)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    // The UI loop is synchronous; spawned work runs on the runtime's workers
    let _enter = runtime.enter();

    tracing::info!(config = %config.config_path.display(), "starting kinlink");
    let api = Arc::new(HttpApi::new(&config.api)?);
    let mut app = ui::app::App::new(api, &config);
    app.run()
}

fn print_field_errors(errors: &FieldErrors) {
    for field in errors.fields() {
        if let Some(message) = errors.get(field) {
            eprintln!("{}: {}", field.label(), message);
        }
    }
}

fn handle_validate(args: ValidateArgs) -> Result<()> {
    let draft = ExternalContactDraft {
        name: args.name,
        phone: args.phone,
        address: args.address,
        relationship: args.relationship,
    };
    let errors = connect::validate::validate(&draft);
    if !errors.is_empty() {
        print_field_errors(&errors);
        bail!("contact details are not valid");
    }
    println!("ok");
    Ok(())
}

fn handle_relationships(config_path: Option<&Path>) -> Result<()> {
    for relationship in config::load_relationships(config_path)? {
        println!("{}", relationship);
    }
    Ok(())
}

async fn handle_search(api: &HttpApi, config: &Config, args: SearchArgs) -> Result<()> {
    if !is_searchable(&args.query) {
        return Ok(());
    }

    let users = api
        .search_users(args.query.trim(), Some(&config.user_id))
        .await
        .map_err(|err| anyhow::anyhow!(search_error_message(&err)))?;

    if users.is_empty() {
        println!("No users found matching \"{}\"", args.query.trim());
    }
    for user in users {
        println!(
            "{}\t{}\t{}\t{}",
            user.id,
            user.name,
            user.email.as_deref().unwrap_or(" "),
            user.status.as_str()
        );
    }
    Ok(())
}

async fn handle_list(api: &HttpApi, config: &Config) -> Result<()> {
    let list = api
        .list_connections(&config.user_id)
        .await
        .context("failed to load connections")?;

    if list.is_empty() {
        println!("No connections yet.");
        return Ok(());
    }

    let region = config.phone_region.as_deref();
    for entry in list.entries() {
        match entry {
            EditingContact::Linked(link) => println!(
                "linked\t{}\t{}\t{}\t{}",
                link.id,
                link.connected_user.name,
                link.relationship,
                link.connected_user.email.as_deref().unwrap_or(" ")
            ),
            EditingContact::External(contact) => println!(
                "external\t{}\t{}\t{}\t{}",
                contact.id,
                contact.name,
                contact.relationship,
                phone::display_phone(&contact.phone, region)
            ),
        }
    }
    Ok(())
}

async fn handle_link(api: HttpApi, config: &Config, args: LinkArgs) -> Result<()> {
    // The service rejects users that are already connected or pending
    let user_id = args.user_id.trim().to_string();
    let candidate = ConnectionCandidate {
        id: user_id.clone(),
        name: user_id,
        email: None,
        status: ConnectionStatus::None,
    };

    let mut modal = modal_for(api, config);
    modal.open(None);
    modal.select_candidate(&candidate);
    modal.set_relationship(args.relationship);
    finish_submission(&mut modal, "Connection request sent.").await
}

async fn handle_add_external(api: &HttpApi, args: ContactArgs) -> Result<()> {
    let mut form = ContactForm::new();
    fill_form(&mut form, args.into_draft());

    let draft = match form.begin_submit(false) {
        Ok(draft) => draft,
        Err(FormBlocked::Invalid(errors)) => {
            print_field_errors(&errors);
            bail!("contact details are not valid");
        }
        Err(FormBlocked::Busy) => bail!("a submission is already in progress"),
    };

    let result = api.add_connection(NewConnection::External(draft)).await;
    let receipt = result.clone().ok();
    form.finish_submit(result.map(|_| ()));

    match receipt {
        Some(receipt) => {
            print_receipt("Contact saved.", &receipt);
            Ok(())
        }
        None => bail!(form.submit_error().unwrap_or_default().to_string()),
    }
}

/// Modal wired to the HTTP service, used for the edit commands
fn modal_for(api: HttpApi, config: &Config) -> ConnectionModal<HttpApi> {
    let api = Arc::new(api);
    let search = SearchResolver::new(
        Arc::clone(&api),
        Some(config.user_id.clone()),
        config.search.debounce,
    );
    ConnectionModal::new(api, search, RelationshipSelector::new(config.relationships.clone()))
}

async fn find_contact(
    api: &HttpApi,
    config: &Config,
    id: &str,
) -> Result<Option<EditingContact>> {
    let list = api
        .list_connections(&config.user_id)
        .await
        .context("failed to load connections")?;
    Ok(list.entries().into_iter().find(|entry| entry.id() == id))
}

async fn handle_edit_linked(api: HttpApi, config: &Config, args: EditLinkedArgs) -> Result<()> {
    let contact = match find_contact(&api, config, &args.id).await? {
        Some(contact @ EditingContact::Linked(_)) => contact,
        _ => bail!("no linked connection with id {}", args.id),
    };

    let mut modal = modal_for(api, config);
    modal.open(Some(contact));
    modal.set_relationship(args.relationship);
    finish_submission(&mut modal, "Saved.").await
}

async fn handle_edit_external(
    api: HttpApi,
    config: &Config,
    args: EditExternalArgs,
) -> Result<()> {
    let contact = match find_contact(&api, config, &args.id).await? {
        Some(contact @ EditingContact::External(_)) => contact,
        _ => bail!("no external contact with id {}", args.id),
    };

    let mut modal = modal_for(api, config);
    modal.open(Some(contact));
    fill_form(modal.form_mut(), args.contact.into_draft());
    finish_submission(&mut modal, "Saved.").await
}

async fn finish_submission(modal: &mut ConnectionModal<HttpApi>, fallback: &str) -> Result<()> {
    match modal.submit().await {
        Ok(SubmitOutcome::Saved { receipt, .. }) => {
            print_receipt(fallback, &receipt);
            Ok(())
        }
        Ok(SubmitOutcome::Failed { message, .. }) => bail!(message),
        Ok(SubmitOutcome::Ignored) => bail!("nothing was submitted"),
        Err(connect::SubmitBlocked::Form(FormBlocked::Invalid(errors))) => {
            print_field_errors(&errors);
            bail!("contact details are not valid")
        }
        Err(blocked) => {
            let notice = modal
                .state()
                .and_then(|state| state.submit_error.clone())
                .unwrap_or_else(|| format!("{:?}", blocked));
            bail!(notice)
        }
    }
}

async fn handle_delete(api: &HttpApi, args: DeleteArgs) -> Result<()> {
    let receipt = api
        .delete_connection(args.id.trim())
        .await
        .map_err(|err| anyhow::anyhow!(submit_error_message(&err)))?;
    print_receipt("Deleted.", &receipt);
    Ok(())
}

fn fill_form(form: &mut ContactForm, draft: ExternalContactDraft) {
    form.set_field(ContactField::Name, draft.name);
    form.set_field(ContactField::Phone, draft.phone);
    form.set_field(ContactField::Address, draft.address.unwrap_or_default());
    form.set_field(ContactField::Relationship, draft.relationship);
}

fn print_receipt(fallback: &str, receipt: &api::SaveReceipt) {
    let message = if receipt.message.trim().is_empty() {
        fallback
    } else {
        receipt.message.trim()
    };
    match &receipt.id {
        Some(id) => println!("{} ({})", message, id),
        None => println!("{}", message),
    }
}
