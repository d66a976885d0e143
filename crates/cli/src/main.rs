use clap::{Parser, Subcommand};
use sctid::{PartitionCategory, SctId, SctIdGenerator};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "tvs")]
#[command(about = "Terminology versioning system CLI")]
struct Cli {
    /// Base URL of a running TVS REST server
    #[arg(long, default_value = "http://localhost:3000", global = true)]
    server: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a child branch
    CreateBranch {
        /// Path of the parent branch, e.g. MAIN
        parent: String,
        /// Name of the new branch
        name: String,
    },
    /// List the direct children of a branch
    Children {
        /// Branch path, e.g. MAIN
        path: String,
    },
    /// Show a branch with its state relative to the parent
    Branch {
        /// Branch path
        path: String,
    },
    /// Compare two branches
    Compare {
        /// Base branch path
        base: String,
        /// Compare branch path
        compare: String,
    },
    /// Merge a branch into its parent (or rebase a child onto its parent)
    Merge {
        /// Source branch path
        source: String,
        /// Target branch path
        target: String,
        /// Commit comment for the merge commit
        #[arg(long)]
        comment: Option<String>,
    },
    /// Generate fresh SCTIDs locally (no server required)
    GenerateId {
        /// Component category: concept, description or relationship
        category: String,
        /// Extension namespace (7 digits); omit for International format
        #[arg(long)]
        namespace: Option<u32>,
        /// How many identifiers to generate
        #[arg(long, default_value_t = 1)]
        quantity: usize,
    },
    /// Validate an SCTID and print its parts
    InspectId {
        /// The identifier to inspect
        sctid: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let server = cli.server.trim_end_matches('/').to_owned();

    match cli.command {
        Some(Commands::CreateBranch { parent, name }) => {
            let response = client
                .post(format!("{server}/branches"))
                .json(&json!({"parent": parent, "name": name}))
                .send()
                .await?;
            print_outcome(response, |body| {
                println!(
                    "Created branch {} (base {})",
                    body["path"].as_str().unwrap_or("?"),
                    body["base_timestamp"]
                );
            })
            .await?;
        }
        Some(Commands::Children { path }) => {
            let response = client
                .get(format!("{server}/branches/{path}/children"))
                .send()
                .await?;
            print_outcome(response, |body| {
                let items = body["items"].as_array().cloned().unwrap_or_default();
                if items.is_empty() {
                    println!("No child branches.");
                }
                for item in items {
                    println!(
                        "{} [{}]{}",
                        item["path"].as_str().unwrap_or("?"),
                        item["state"].as_str().unwrap_or("-"),
                        if item["deleted"].as_bool().unwrap_or(false) {
                            " (deleted)"
                        } else {
                            ""
                        }
                    );
                }
            })
            .await?;
        }
        Some(Commands::Branch { path }) => {
            let response = client.get(format!("{server}/branches/{path}")).send().await?;
            print_outcome(response, |body| {
                println!(
                    "{} base={} head={} state={}",
                    body["path"].as_str().unwrap_or("?"),
                    body["base_timestamp"],
                    body["head_timestamp"],
                    body["state"].as_str().unwrap_or("-")
                );
            })
            .await?;
        }
        Some(Commands::Compare { base, compare }) => {
            let response = client
                .post(format!("{server}/compare"))
                .json(&json!({"base": base, "compare": compare}))
                .send()
                .await?;
            print_outcome(response, |body| {
                for (label, key) in [
                    ("New", "new_components"),
                    ("Changed", "changed_components"),
                    ("Deleted", "deleted_components"),
                ] {
                    for component in body[key].as_array().cloned().unwrap_or_default() {
                        println!(
                            "{label}: {} {}",
                            component["category"].as_str().unwrap_or("?"),
                            component["id"].as_str().unwrap_or("?")
                        );
                    }
                }
            })
            .await?;
        }
        Some(Commands::Merge {
            source,
            target,
            comment,
        }) => {
            let response = client
                .post(format!("{server}/merges"))
                .json(&json!({
                    "source": source,
                    "target": target,
                    "commit_comment": comment
                }))
                .send()
                .await?;
            if !response.status().is_success() {
                print_error(response).await?;
                return Ok(());
            }
            let merge: Value = response.json().await?;
            let id = merge["id"].as_str().unwrap_or_default().to_owned();
            // The merge runs in the background; poll until terminal.
            loop {
                let current: Value = client
                    .get(format!("{server}/merges/{id}"))
                    .send()
                    .await?
                    .json()
                    .await?;
                match current["status"].as_str().unwrap_or_default() {
                    "COMPLETED" => {
                        println!("Merge completed.");
                        break;
                    }
                    "CONFLICTS" => {
                        println!("Merge has conflicts:");
                        for conflict in current["conflicts"].as_array().cloned().unwrap_or_default()
                        {
                            println!(
                                "  {} {} ({})",
                                conflict["category"].as_str().unwrap_or("?"),
                                conflict["id"].as_str().unwrap_or("?"),
                                conflict["kind"].as_str().unwrap_or("?")
                            );
                        }
                        break;
                    }
                    "FAILED" => {
                        eprintln!(
                            "Merge failed: {}",
                            current["failure_reason"].as_str().unwrap_or("unknown")
                        );
                        break;
                    }
                    _ => tokio::time::sleep(std::time::Duration::from_millis(100)).await,
                }
            }
        }
        Some(Commands::GenerateId {
            category,
            namespace,
            quantity,
        }) => {
            let category = match category.to_ascii_lowercase().as_str() {
                "concept" => PartitionCategory::Concept,
                "description" => PartitionCategory::Description,
                "relationship" => PartitionCategory::Relationship,
                other => {
                    eprintln!("Unknown category '{other}'");
                    return Ok(());
                }
            };
            let namespace = namespace.map(sctid::Namespace::new).transpose()?;
            let generator = SctIdGenerator::new();
            for id in generator.reserve(namespace, category, quantity)? {
                println!("{id}");
            }
        }
        Some(Commands::InspectId { sctid }) => match SctId::parse(&sctid) {
            Ok(id) => {
                println!("valid: {id}");
                println!("  item id:   {}", id.item_id());
                println!("  category:  {}", id.category().as_str());
                match id.namespace() {
                    Some(ns) => println!("  namespace: {ns}"),
                    None => println!("  namespace: (International)"),
                }
            }
            Err(e) => eprintln!("invalid: {e}"),
        },
        None => {
            println!("Use 'tvs --help' for commands");
        }
    }

    Ok(())
}

async fn print_outcome(
    response: reqwest::Response,
    on_success: impl FnOnce(Value),
) -> Result<(), Box<dyn std::error::Error>> {
    if response.status().is_success() {
        on_success(response.json().await?);
        Ok(())
    } else {
        print_error(response).await
    }
}

async fn print_error(response: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    eprintln!(
        "Error {}: {}",
        status.as_u16(),
        body["message"].as_str().unwrap_or("request failed")
    );
    Ok(())
}
