use std::borrow::Cow;

use crate::models::referrals::{level_label, Referral};
use crate::models::users::User;

const HEADER: [&str; 6] = ["Name", "Email", "Phone", "Join Date", "Level", "Status"];
const UNAVAILABLE: &str = "N/A";

fn escape(value: &str) -> Cow<'_, str> {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn push_line(csv_content: &mut String, fields: &[&str]) {
    let line: Vec<Cow<'_, str>> = fields.iter().map(|field| escape(field)).collect();
    csv_content.push_str(&line.join(","));
    csv_content.push('\n');
}

fn non_empty(value: &str) -> &str {
    if value.is_empty() {
        UNAVAILABLE
    } else {
        value
    }
}

/// Render a network listing as CSV. Each edge comes with the referred user's record, when one
/// could be read.
pub fn to_csv(rows: &[(Referral, Option<User>)]) -> String {
    let mut csv_content = String::new();

    push_line(&mut csv_content, &HEADER);

    for (referral, user) in rows {
        let (name, email, phone) = match user {
            Some(user) => (
                non_empty(&user.name),
                non_empty(&user.email),
                non_empty(&user.phone),
            ),
            None => (UNAVAILABLE, UNAVAILABLE, UNAVAILABLE),
        };
        let join_date = referral.timestamp.format("%d/%m/%Y").to_string();
        let level = level_label(referral.level);

        push_line(
            &mut csv_content,
            &[
                name,
                email,
                phone,
                join_date.as_str(),
                level.as_str(),
                referral.status.as_str(),
            ],
        );
    }

    csv_content
}
