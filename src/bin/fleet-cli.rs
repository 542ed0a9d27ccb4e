use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use fleet_controller::api::{new_client_facade, Connection, OffersClient};
use fleet_controller::facades::offers::{
    AddApplicationOffer, ApplicationOffer, ApplicationOfferFilter, EndpointFilterTerm, RemoteEndpoint,
};

#[derive(Parser)]
#[command(name = "fleet-cli")]
#[command(about = "Command-line client for the fleet controller API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:17070")]
    address: String,

    #[arg(short, long, default_value = "user-admin")]
    tag: String,

    #[arg(short, long, default_value = "")]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the facades and versions this login may call
    Facades,
    /// Call any facade method with JSON parameters
    Call {
        facade: String,
        method: String,
        /// JSON parameters (defaults to null)
        params: Option<String>,
        /// Facade version (defaults to the best offered at login)
        #[arg(long)]
        version: Option<u32>,
    },
    /// Offer application endpoints for use by other models
    Offer {
        application: String,
        /// Endpoints as name:role:interface
        #[arg(required = true)]
        endpoints: Vec<String>,
        #[arg(long)]
        offer_name: Option<String>,
        #[arg(long, default_value = "")]
        model: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Find offered application endpoints
    FindEndpoints {
        /// [<owner>/]<model>[.<offer>]
        url: Option<String>,
        #[arg(long)]
        interface: Option<String>,
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let conn = Connection::open(&cli.address, &cli.tag, &cli.password).await?;

    let result = run(&conn, cli.command).await;
    conn.close().await;
    print_json(&result?)
}

async fn run(conn: &Connection, command: Commands) -> Result<Value, Box<dyn std::error::Error>> {
    match command {
        Commands::Facades => Ok(serde_json::to_value(conn.facades())?),
        Commands::Call {
            facade,
            method,
            params,
            version,
        } => {
            let params: Value = match params {
                Some(text) => serde_json::from_str(&text)?,
                None => Value::Null,
            };
            let value = match version {
                Some(version) => conn.call(&facade, version, &method, params).await?,
                None => {
                    let (_front, caller) = new_client_facade(conn, &facade)?;
                    caller.facade_call::<Value, Value>(&method, &params).await?
                }
            };
            Ok(value)
        }
        Commands::Offer {
            application,
            endpoints,
            offer_name,
            model,
            description,
        } => {
            let endpoints = endpoints
                .iter()
                .map(|spec| parse_endpoint(spec))
                .collect::<Result<Vec<_>, _>>()?;
            let offer = AddApplicationOffer {
                model_name: model,
                offer_name: offer_name.unwrap_or_else(|| application.clone()),
                application_name: application,
                application_description: description,
                endpoints,
                ..Default::default()
            };
            let client = OffersClient::new(conn)?;
            let results = client.offer(vec![offer]).await?;
            if let Some(err) = results.into_iter().find_map(|r| r.error) {
                return Err(err.into());
            }
            Ok(json!({"offered": true}))
        }
        Commands::FindEndpoints {
            url,
            interface,
            endpoint,
        } => {
            let mut filter = match url {
                Some(url) => ApplicationOfferFilter::from_url(&url)?,
                None => ApplicationOfferFilter::default(),
            };
            if interface.is_some() || endpoint.is_some() {
                filter.endpoints.push(EndpointFilterTerm {
                    interface: interface.unwrap_or_default(),
                    name: endpoint.unwrap_or_default(),
                    ..Default::default()
                });
            }
            let client = OffersClient::new(conn)?;
            let found = client.find_application_offers(vec![filter]).await?;
            if found.is_empty() {
                return Err("no matching application offers found".into());
            }
            Ok(offers_by_url(found))
        }
    }
}

fn parse_endpoint(spec: &str) -> Result<RemoteEndpoint, String> {
    match spec.split(':').collect::<Vec<_>>().as_slice() {
        [name, role, interface] if !name.is_empty() && !interface.is_empty() => Ok(RemoteEndpoint {
            name: name.to_string(),
            role: role.to_string(),
            interface: interface.to_string(),
        }),
        _ => Err(format!("invalid endpoint {spec:?}: expected name:role:interface")),
    }
}

/// Offers keyed by URL, each with its access and endpoints keyed by name.
fn offers_by_url(offers: Vec<ApplicationOffer>) -> Value {
    let mut out = Map::new();
    for offer in offers {
        let endpoints: Map<String, Value> = offer
            .endpoints
            .into_iter()
            .map(|ep| (ep.name, json!({"interface": ep.interface, "role": ep.role})))
            .collect();
        out.insert(offer.offer_url, json!({"access": offer.access, "endpoints": endpoints}));
    }
    Value::Object(out)
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
