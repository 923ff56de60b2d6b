//! Prompt builders for each AI endpoint

use super::analytics::{DailyMetrics, PipelineSnapshot, SalesPoint};
use super::traits::{ChatMessage, CompletionRequest};
use crate::store::models::Client;
use crate::BusinessConfig;

/// Human name of a language code, for "respond in ..." instructions
fn language_name(code: &str) -> &str {
    match code.to_lowercase().as_str() {
        "es" | "es-cr" => "Spanish",
        "en" | "en-us" => "English",
        "pt" | "pt-br" => "Portuguese",
        _ => code,
    }
}

/// `12500.4` → `₡12,500`
pub fn money(currency: &str, amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if whole < 0 { "-" } else { "" };
    format!("{}{}{}", sign, currency, grouped)
}

/// Daily executive summary (plain text)
pub fn daily_summary(metrics: &DailyMetrics, business: &BusinessConfig) -> CompletionRequest {
    let c = &business.currency_symbol;
    let prompt = format!(
        "You are a business assistant for {name}, a {kind}, expert in sales and data analysis.\n\
         Analyze today's figures and write an executive summary:\n\n\
         Today's data:\n\
         - Total sales: {sales}\n\
         - Customers served: {customers}\n\
         - Average ticket: {ticket}\n\
         - New customers: {new}\n\
         - Returning customers: {returning}\n\n\
         Write 3-4 lines covering:\n\
         1. The highlight of the day\n\
         2. How it compares with typical figures\n\
         3. One actionable recommendation\n\
         4. One insight about customer behavior\n\n\
         Be specific and useful, friendly but professional. Respond in {language}.",
        name = business.name,
        kind = business.business_type,
        sales = money(c, metrics.total_sales),
        customers = metrics.customer_count,
        ticket = money(c, metrics.average_ticket),
        new = metrics.new_customers,
        returning = metrics.returning_customers,
        language = language_name(&business.language),
    );
    CompletionRequest::prompt(prompt)
        .temperature(0.7)
        .max_tokens(200)
}

/// Single-customer analysis (JSON)
pub fn customer_analysis(
    client: &Client,
    days_since_last_visit: i64,
    business: &BusinessConfig,
) -> CompletionRequest {
    let c = &business.currency_symbol;
    let last_visit = if days_since_last_visit > 0 {
        format!("{} days ago", days_since_last_visit)
    } else {
        "today".to_string()
    };
    let prompt = format!(
        "Analyze this customer of a {kind} and produce actionable insights:\n\n\
         Customer: {name}\n\
         - Total spent: {spent}\n\
         - Number of visits: {visits}\n\
         - Last visit: {last_visit}\n\
         - Average ticket: {avg}\n\n\
         Reply with a JSON object with:\n\
         1. \"risk_level\": number 0-100 (probability of losing the customer)\n\
         2. \"status\": \"active\", \"at_risk\", \"lost\" or \"vip\"\n\
         3. \"insights\": array of 2-3 key observations\n\
         4. \"recommendations\": array of 2-3 specific actions\n\
         5. \"estimated_lifetime_value\": estimated spend over the next 6 months\n\
         6. \"next_best_action\": the single most important action\n\n\
         Consider typical customer behavior patterns. Write the text fields in {language}.",
        kind = business.business_type,
        name = client.name,
        spent = money(c, client.total_spent),
        visits = client.visit_count,
        avg = money(c, client.average_spent),
        language = language_name(&business.language),
    );
    CompletionRequest::prompt(prompt)
        .temperature(0.5)
        .max_tokens(300)
        .json()
}

/// Sales forecast for the next `days` days (JSON)
pub fn sales_prediction(
    history: &[SalesPoint],
    days: u64,
    business: &BusinessConfig,
) -> CompletionRequest {
    let c = &business.currency_symbol;
    let lines: Vec<String> = history
        .iter()
        .map(|p| format!("{}: {}", p.date.format("%Y-%m-%d"), money(c, p.amount)))
        .collect();
    let prompt = format!(
        "Based on this sales history, predict sales for the next {days} days.\n\n\
         History (last {n} days):\n{history}\n\n\
         Consider:\n\
         - Weekly patterns (weekends vs weekdays)\n\
         - General trends\n\
         - Seasonal factors\n\n\
         Reply with a JSON object:\n\
         {{\n  \"predictions\": [\n    {{\"date\": \"YYYY-MM-DD\", \"amount\": number, \"confidence\": 0-100, \"day_of_week\": \"day\"}}\n  ],\n  \
         \"insights\": [\"insight1\", \"insight2\"],\n  \
         \"recommendations\": [\"recommendation1\", \"recommendation2\"]\n}}\n\
         Write the text fields in {language}.",
        days = days,
        n = history.len(),
        history = lines.join("\n"),
        language = language_name(&business.language),
    );
    CompletionRequest::prompt(prompt)
        .temperature(0.3)
        .max_tokens(400)
        .json()
}

/// Pipeline insights (JSON)
pub fn pipeline_insights(snapshot: &PipelineSnapshot, business: &BusinessConfig) -> CompletionRequest {
    let c = &business.currency_symbol;
    let stage_lines: Vec<String> = snapshot
        .stages
        .iter()
        .map(|s| {
            format!(
                "- {}: {} clients, average {} days, value {}",
                s.stage_name,
                s.count,
                s.avg_days.round(),
                money(c, s.total_value)
            )
        })
        .collect();
    let m = &snapshot.metrics;
    let prompt = format!(
        "Analyze this sales pipeline and produce 3-5 actionable insights:\n\n\
         Pipeline data:\n{stages}\n\n\
         Specific situations:\n\
         - {stuck} clients have been in the same stage for more than 15 days\n\
         - {high} high-value clients (>{threshold})\n\
         - {risk} clients with a high churn risk\n\
         - Total clients in the pipeline: {total}\n\n\
         Reply with a JSON object:\n\
         {{\n  \"insights\": [\n    {{\n      \"type\": \"bottleneck|opportunity|risk|conversion|optimization\",\n      \
         \"message\": \"specific, actionable insight\",\n      \"priority\": \"high|medium|low\",\n      \
         \"actionable\": true,\n      \"recommendation\": \"specific action to take\"\n    }}\n  ]\n}}\n\n\
         Focus on bottlenecks, conversion opportunities, clients needing urgent attention and \
         behavior patterns. Name stages and numbers. Be professional and direct. \
         Write the text fields in {language}.",
        stages = stage_lines.join("\n"),
        stuck = m.stuck_clients,
        high = m.high_value_clients,
        threshold = money(c, crate::crm::pipeline::VIP_SPEND_THRESHOLD),
        risk = m.at_risk_clients,
        total = m.total_clients,
        language = language_name(&business.language),
    );
    CompletionRequest::prompt(prompt)
        .temperature(0.3)
        .max_tokens(600)
        .json()
}

/// System prompt of the chat assistant
pub fn chat_system(
    business: &BusinessConfig,
    current_page: Option<&str>,
    data_context: Option<&str>,
    has_chart: bool,
) -> ChatMessage {
    let mut prompt = format!(
        "You are Kuna, a friendly and professional AI assistant for the CRM of {name}, a {kind}.\n\
         Your personality:\n\
         - Enthusiastic but professional\n\
         - You use emojis occasionally\n\
         - Concise but complete answers\n\
         - You present data clearly\n\
         - You take the user's current page into account\n\
         - You are an expert in sales, customers and business analysis\n\
         - NEVER use brackets to describe visual elements such as \"[Chart of ...]\"\n\
         - Talk naturally about the data instead of describing what is displayed\n\
         - Amounts are in {currency}\n\
         - Respond in {language}\n",
        name = business.name,
        kind = business.business_type,
        currency = business.currency_symbol,
        language = language_name(&business.language),
    );
    if has_chart {
        prompt.push_str(
            "- IMPORTANT: a chart is shown to the user automatically. Only comment on the key \
             insights of the data conversationally.\n",
        );
    }
    prompt.push_str(&format!(
        "\nCurrent context:\n- User's current page: {}\n",
        current_page.unwrap_or("unknown")
    ));
    if let Some(data) = data_context {
        prompt.push_str(&format!("- Current business data: {}\n", data));
    }
    ChatMessage::system(prompt)
}
