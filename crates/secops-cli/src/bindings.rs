use clap::Subcommand;

/// Sub-commands available under `bindings`.
#[derive(Debug, Subcommand)]
pub enum BindingsCommands {
    /// List customers with an enabled binding for an integration
    List {
        /// Integration name, e.g. `duo`
        integration: String,
    },
}

/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_bindings_list(pool: &sqlx::PgPool, integration: &str) -> anyhow::Result<()> {
    let integration = integration.trim().to_ascii_lowercase();
    let customers = secops_db::list_customers_for_integration(pool, &integration).await?;
    if customers.is_empty() {
        println!("no customers bound to {integration}");
        return Ok(());
    }

    println!("{} customer(s) bound to {integration}:", customers.len());
    for code in &customers {
        println!("  {code}");
    }
    Ok(())
}
