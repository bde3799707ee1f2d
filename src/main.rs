use anyhow::{Context, bail};
use parkspot::auth::{self, RegistrationForm};
use parkspot::shared::{SpotBoard, SpotNumber, SpotStatus};
use parkspot::{
    Access, AdminConsole, AppRoute, AvailabilityFetcher, BookingSubmitter, ClientConfig,
    FileStorage, MutationOutcome, ParkingApi, ReqwestHttpClient, Router, SessionStore,
    SubmitOutcome,
};
use std::rc::Rc;

type Api = ParkingApi<ReqwestHttpClient>;

const USAGE: &str = "usage: parkspot <command>

commands:
  spots                              show which spots are free
  login <email> <password>
  register <email> <password> <confirm>
  logout
  whoami
  book <spot> <car-number> <hours>
  admin users|bookings|blocked
  admin toggle-role <user-id>
  admin cancel <booking-id>
  admin toggle-spot <spot>";

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "parkspot=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ClientConfig::from_env();
    tracing::debug!(?config, "configuration loaded");

    let storage = Rc::new(FileStorage::new(&config.session_file));
    let store = Rc::new(SessionStore::standalone(storage));
    let client = ReqwestHttpClient::new(config.http_timeout)?;
    let api = Rc::new(ParkingApi::new(config.api_url.clone(), client, Rc::clone(&store)));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["spots"] => spots(&api).await,
        ["login", email, password] => login(&api, email, password).await,
        ["register", email, password, confirm] => register(&api, email, password, confirm).await,
        ["logout"] => {
            auth::logout(&store)?;
            println!("Signed out");
            Ok(())
        }
        ["whoami"] => {
            match store.load() {
                Some(session) => println!("user {} ({})", session.user_id, session.role),
                None => println!("not signed in"),
            }
            Ok(())
        }
        ["book", spot, car, hours] => book(&api, spot, car, hours).await,
        ["admin", rest @ ..] => admin(&api, rest).await,
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn parse_spot(raw: &str) -> anyhow::Result<SpotNumber> {
    let n: i64 = raw.parse().with_context(|| format!("invalid spot number '{}'", raw))?;
    Ok(SpotNumber::new(n)?)
}

fn parse_id(raw: &str) -> anyhow::Result<i64> {
    raw.parse().with_context(|| format!("invalid id '{}'", raw))
}

fn print_board(board: &SpotBoard) {
    for spot in board.spots() {
        let label = match spot.status {
            SpotStatus::Free => "free",
            SpotStatus::Occupied => "occupied",
            SpotStatus::Blocked => "blocked",
        };
        println!("{:>3}  {}", spot.number.get(), label);
    }
}

fn denied(access: &Access) -> anyhow::Result<()> {
    match access {
        Access::Permit => Ok(()),
        Access::Redirect(AppRoute::Login) => {
            bail!("not signed in; run `parkspot login <email> <password>`")
        }
        Access::Redirect(route) => bail!("access denied (redirected to {})", route),
    }
}

async fn spots(api: &Rc<Api>) -> anyhow::Result<()> {
    let submitter = BookingSubmitter::new(Rc::new(AvailabilityFetcher::new(Rc::clone(api))));
    denied(&submitter.mount().await)?;

    let availability = submitter.availability();
    if let Some(notice) = availability.notice() {
        println!("{}", notice);
    }
    print_board(&availability.board());
    Ok(())
}

async fn login(api: &Rc<Api>, email: &str, password: &str) -> anyhow::Result<()> {
    let router = Router::new(Rc::clone(api.session()), AppRoute::Login.to_path());
    let session = auth::login(api, email, password).await?;
    let landed = router.navigate_to(AppRoute::login_success_redirect());
    println!("Signed in as user {} ({}), continue at {}", session.user_id, session.role, landed);
    Ok(())
}

async fn register(api: &Rc<Api>, email: &str, password: &str, confirm: &str) -> anyhow::Result<()> {
    let router = Router::new(Rc::clone(api.session()), AppRoute::Register.to_path());
    let form = RegistrationForm::new(email, password, confirm);
    let session = auth::register(api, &form).await?;
    let landed = router.navigate_to(AppRoute::register_success_redirect());
    println!("Registered user {}, continue at {}", session.user_id, landed);
    Ok(())
}

async fn book(api: &Rc<Api>, spot: &str, car: &str, hours: &str) -> anyhow::Result<()> {
    let spot = parse_spot(spot)?;
    let hours: u32 = hours
        .parse()
        .with_context(|| format!("invalid number of hours '{}'", hours))?;

    let submitter = BookingSubmitter::new(Rc::new(AvailabilityFetcher::new(Rc::clone(api))));
    denied(&submitter.mount().await)?;

    submitter.set_car_number(car);
    submitter.set_hours(hours)?;
    submitter.select_spot(spot)?;
    println!("Price: {}", submitter.price());

    match submitter.submit().await {
        SubmitOutcome::Confirmed(c) => {
            println!(
                "Booked spot {} for {} until {} ({} h, {})",
                c.spot,
                c.car_number,
                c.end_time.format("%Y-%m-%d %H:%M UTC"),
                c.hours,
                c.price
            );
            Ok(())
        }
        SubmitOutcome::Rejected(reason) | SubmitOutcome::Failed(reason) => bail!(reason),
        SubmitOutcome::Unauthorized => denied(&Access::Redirect(AppRoute::Login)),
        SubmitOutcome::Ignored => bail!("a booking is already being submitted"),
    }
}

async fn admin(api: &Rc<Api>, args: &[&str]) -> anyhow::Result<()> {
    let console = AdminConsole::new(Rc::clone(api));
    denied(&console.mount().await)?;

    let outcome = match args {
        ["users"] => {
            for user in console.users() {
                println!("{:>5}  {:<6} {}", user.id, user.role.as_str(), user.email);
            }
            None
        }
        ["bookings"] => {
            for b in console.bookings() {
                println!(
                    "{:>5}  spot {:>2}  {:<10} {} -> {} ({} h)",
                    b.id,
                    b.parking_spot.get(),
                    b.car_number,
                    b.reserved_at.format("%Y-%m-%d %H:%M"),
                    b.end_time().format("%H:%M"),
                    b.hours
                );
            }
            None
        }
        ["blocked"] => {
            print_board(&console.spot_board());
            None
        }
        ["toggle-role", id] => Some(console.toggle_user_role(parse_id(id)?).await),
        ["cancel", id] => Some(console.cancel_booking(parse_id(id)?).await),
        ["toggle-spot", spot] => Some(console.toggle_spot_block(parse_spot(spot)?).await),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    if outcome.is_none() {
        if let Some(notice) = console.notice() {
            eprintln!("{}", notice.text);
        }
    }

    match outcome {
        None | Some(MutationOutcome::Ignored) => Ok(()),
        Some(MutationOutcome::Done(text)) => {
            println!("{}", text);
            Ok(())
        }
        Some(MutationOutcome::Failed(text)) => bail!(text),
        Some(MutationOutcome::Unauthorized) => denied(&Access::Redirect(AppRoute::Login)),
    }
}
