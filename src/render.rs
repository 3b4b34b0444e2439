//! Plain-text views for the terminal.

use crate::donors::{DonorSource, DonorStats};
use crate::map::MapView;
use crate::model::{BloodGroup, DonorRecord, User};
use crate::profile::ProfileForm;
use crate::validation::FormErrors;
use chrono::NaiveDate;
use std::fmt::Write;

pub const NO_MATCHES: &str = "No donors matching your criteria";

pub fn banner(message: &str) -> String {
    format!("Error: {}", message)
}

pub fn notice(message: &str) -> String {
    format!("OK: {}", message)
}

pub fn field_errors(errors: &FormErrors) -> String {
    errors
        .iter()
        .map(|e| format!("  {}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn availability(available: bool) -> &'static str {
    if available {
        "Available Now"
    } else {
        "Unavailable"
    }
}

pub fn donor_card(donor: &DonorRecord, today: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "[{}] {}  {} ({})",
        donor.initials(),
        donor.name,
        donor.blood_group,
        donor.blood_group.color()
    );
    let _ = writeln!(out, "    Location: {}", donor.location);
    match (donor.last_donated, donor.days_since_donation(today)) {
        (Some(date), Some(days)) if days > 0 => {
            let _ = writeln!(out, "    Last donated: {} ({} days ago)", date, days);
        }
        (Some(date), _) => {
            let _ = writeln!(out, "    Last donated: {}", date);
        }
        _ => {
            let _ = writeln!(out, "    Last donated: No donation history");
        }
    }
    if !donor.contact_number.is_empty() {
        let _ = writeln!(out, "    Contact: {}", donor.contact_number);
    }
    let _ = write!(out, "    Status: {}", availability(donor.available));
    out
}

pub fn donor_list(donors: &[DonorRecord], source: Option<DonorSource>, today: NaiveDate) -> String {
    if donors.is_empty() {
        return NO_MATCHES.to_string();
    }
    let mut out = String::new();
    for donor in donors {
        out.push_str(&donor_card(donor, today));
        out.push_str("\n\n");
    }
    let _ = write!(out, "{} donor(s)", donors.len());
    if source == Some(DonorSource::Fallback) {
        out.push_str(" (demo data)");
    }
    out
}

pub fn stats(stats: &DonorStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Total donors:     {}", stats.total);
    let _ = writeln!(out, "Available now:    {}", stats.available);
    let _ = writeln!(out, "Locations:        {}", stats.locations);
    let _ = writeln!(
        out,
        "Most common group: {}",
        stats
            .most_common_group()
            .map(|g| g.as_str())
            .unwrap_or("N/A")
    );
    let groups: Vec<String> = BloodGroup::ALL
        .iter()
        .map(|g| format!("{} {}", g, stats.by_group.get(g).copied().unwrap_or(0)))
        .collect();
    let _ = write!(out, "By group:         {}", groups.join("  "));
    out
}

pub fn user_summary(user: &User) -> String {
    let role = if user.is_donor || user.donor.is_some() {
        "donor"
    } else {
        "member"
    };
    format!("{} <{}> ({})", user.full_name(), user.email, role)
}

pub fn profile(form: &ProfileForm) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}  (id {})", form.first_name, form.last_name, form.id);
    let _ = writeln!(out, "  Email:  {}", form.email);
    let _ = writeln!(out, "  Phone:  {}", form.phone_number);
    let _ = writeln!(out, "  City:   {}", form.city);
    if form.is_donor {
        let _ = writeln!(
            out,
            "  Blood group: {}",
            form.blood_group.map(|g| g.as_str()).unwrap_or("-")
        );
        let _ = writeln!(
            out,
            "  Last donation: {}",
            form.last_donation_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        let _ = writeln!(out, "  Status: {}", availability(form.available_for_donation));
        let _ = write!(
            out,
            "  Contact consent: {}",
            if form.consent_to_contact { "yes" } else { "no" }
        );
    } else {
        let _ = write!(out, "  Not registered as a donor (use /edit to become one)");
    }
    out
}

pub fn map_view(view: &MapView, width: usize, height: usize) -> String {
    let mut out = String::new();
    let center = view.center();
    let _ = writeln!(
        out,
        "Center {:.4},{:.4}  zoom {}",
        center.lat,
        center.lon,
        view.zoom()
    );
    let markers = view.markers();
    if markers.is_empty() {
        let _ = writeln!(out, "{}", NO_MATCHES);
    }
    for m in &markers {
        let _ = writeln!(
            out,
            "{:>3}  {:<4} {:<20} {:<16} {:>9.4},{:<10.4} {} {}",
            m.label,
            m.donor.blood_group.as_str(),
            m.donor.name,
            m.donor.location,
            m.position.lat,
            m.position.lon,
            m.color,
            availability(m.donor.available)
        );
    }
    out.push_str(&view.plot(width, height));
    out.push('\n');

    let stats = view.stats();
    let _ = write!(
        out,
        "Showing {} of {} donors, {} available, most common group {}",
        view.shown().len(),
        stats.total,
        stats.available,
        stats
            .most_common_group()
            .map(|g| g.as_str())
            .unwrap_or("N/A")
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::donors::sample_donors;
    use crate::model::DonorFilters;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    #[test]
    fn test_donor_card() {
        let donors = sample_donors(&DonorFilters::default());
        let card = donor_card(&donors[0], today());
        assert!(card.starts_with("[JD] John Doe  A+ (#d32f2f)"));
        assert!(card.contains("(31 days ago)"));
        assert!(card.contains("+1 (555) 123-4567"));
        assert!(card.ends_with("Available Now"));

        let card = donor_card(&donors[2], today());
        assert!(card.ends_with("Unavailable"));
    }

    #[test]
    fn test_donor_card_without_history() {
        let mut donor = sample_donors(&DonorFilters::default()).remove(0);
        donor.last_donated = None;
        assert!(donor_card(&donor, today()).contains("No donation history"));
    }

    #[test]
    fn test_empty_list_and_demo_marker() {
        assert_eq!(donor_list(&[], None, today()), NO_MATCHES);
        let donors = sample_donors(&DonorFilters::default());
        let text = donor_list(&donors, Some(DonorSource::Fallback), today());
        assert!(text.ends_with("5 donor(s) (demo data)"));
    }

    #[test]
    fn test_stats_most_common_na_when_empty() {
        let text = stats(&DonorStats::default());
        assert!(text.contains("Most common group: N/A"));
        assert!(text.contains("O- 0"));
    }

    #[test]
    fn test_banner_and_notice() {
        assert_eq!(banner("Login failed"), "Error: Login failed");
        assert_eq!(notice("saved"), "OK: saved");
    }
}
