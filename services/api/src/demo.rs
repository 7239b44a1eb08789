use clap::Args;
use finaid::applications::{Application, ApplicationId, ApplicationPatch, Verdict};
use finaid::config::AuthConfig;
use finaid::desk::NewUser;
use finaid::error::AppError;
use finaid::identity::{Role, User};
use finaid::{AidDesk, DeskError};
use std::sync::Barrier;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Credential shared by the seeded demo accounts
    #[arg(long, default_value = "password")]
    pub(crate) password: String,
    /// Number of approvers racing to decide the same application
    #[arg(long, default_value_t = 8)]
    pub(crate) racers: usize,
    /// Print the closing dashboard as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        password,
        racers,
        json,
    } = args;

    println!("Financial aid desk demo");
    let desk = AidDesk::from_config(&AuthConfig::default());
    let seeded = desk.seed_demo(&password)?;
    for user in &seeded {
        println!(
            "- seeded {} <{}> as {}{}",
            user.name,
            user.email,
            user.role.label(),
            if user.is_first_login {
                " (password change pending)"
            } else {
                ""
            }
        );
    }
    let mut accounts = seeded.into_iter();
    let (Some(admin), Some(counselor), Some(approver)) =
        (accounts.next(), accounts.next(), accounts.next())
    else {
        return Err(DeskError::NotFound("demo account").into());
    };

    let session = desk.login(&counselor.email, &password)?;
    println!("\n{} signed in (session established)", session.user.name);

    println!("\nSubmission and review");
    let application = desk.create_application(&counselor, "Student One", 5000.0, "Tuition")?;
    println!(
        "- {} submitted {} for {:.2} -> {}",
        counselor.name,
        application.id,
        application.amount,
        application.status().label()
    );
    let reviewed = desk.review(
        &approver,
        &application.id,
        Verdict::Approved,
        "meets requirements",
    )?;
    println!(
        "- {} decided {} -> {}",
        approver.name,
        reviewed.id,
        reviewed.status().label()
    );
    report(
        "second review of the same application",
        desk.review(&approver, &application.id, Verdict::Rejected, "second opinion"),
    );
    report(
        "edit after review",
        desk.update_application(
            &counselor,
            &application.id,
            ApplicationPatch {
                amount: Some(4000.0),
                ..ApplicationPatch::default()
            },
        ),
    );

    println!("\nAccess control");
    let colleague = desk.create_user(
        &admin,
        NewUser {
            name: "Second Counselor".to_string(),
            email: "counselor2@example.com".to_string(),
            role: Role::Counselor,
            password: password.clone(),
        },
    )?;
    let foreign =
        desk.create_application(&colleague, "Student Two", 7500.0, "Books and Supplies")?;
    report(
        "counselor editing a colleague's application",
        desk.update_application(
            &counselor,
            &foreign.id,
            ApplicationPatch {
                amount: Some(1.0),
                ..ApplicationPatch::default()
            },
        ),
    );
    report(
        "counselor reviewing an application",
        desk.review(&counselor, &foreign.id, Verdict::Approved, "self-approval"),
    );
    report(
        "zero amount submission",
        desk.create_application(&counselor, "Student Three", 0.0, "Housing"),
    );

    println!("\nConcurrent review race ({racers} approvers)");
    let contested = desk.create_application(&counselor, "Student Four", 3200.0, "Tuition")?;
    let outcomes = race_reviews(&desk, &approver, &contested.id, racers);
    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    let already = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Err(DeskError::AlreadyReviewed)))
        .count();
    let stored = desk.application(&approver, &contested.id)?;
    println!("- {winners} decision committed, {already} rejected as already reviewed");
    if let Some(decision) = stored.decision() {
        println!(
            "- final state {} ({})",
            stored.status().label(),
            decision.reason
        );
    }

    println!("\nDashboard");
    let dashboard = desk.dashboard(&admin)?;
    if json {
        match serde_json::to_string_pretty(&dashboard) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => println!("  Dashboard payload unavailable: {err}"),
        }
    } else {
        let summary = &dashboard.applications;
        println!(
            "- {} applications | {} pending | {} approved | {} rejected | {:.2} requested",
            summary.total,
            summary.pending,
            summary.approved,
            summary.rejected,
            summary.total_requested
        );
        if let Some(rate) = summary.approval_rate {
            println!("- approval rate {:.0}%", rate * 100.0);
        }
        if let Some(users) = &dashboard.users {
            println!(
                "- {} accounts ({} admins, {} counselors, {} approvers)",
                users.total, users.admins, users.counselors, users.approvers
            );
        }
    }

    Ok(())
}

/// Fires `racers` concurrent reviews at one application. A panicking racer propagates.
fn race_reviews(
    desk: &AidDesk,
    approver: &User,
    id: &ApplicationId,
    racers: usize,
) -> Vec<Result<Application, DeskError>> {
    let racers = racers.max(1);
    let barrier = Barrier::new(racers);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..racers)
            .map(|n| {
                let barrier = &barrier;
                scope.spawn(move || {
                    let verdict = if n % 2 == 0 {
                        Verdict::Approved
                    } else {
                        Verdict::Rejected
                    };
                    barrier.wait();
                    desk.review(approver, id, verdict, &format!("racer {n}"))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    })
}

fn report<T>(scenario: &str, outcome: Result<T, DeskError>) {
    match outcome {
        Ok(_) => println!("- {scenario}: accepted"),
        Err(err) => println!(
            "- {scenario}: refused with {} ({err})",
            err.status_code().as_u16()
        ),
    }
}
