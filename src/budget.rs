//! Token Budget: priority-weighted allocation of a finite token window across
//! context components, with surplus redistribution (spec §4.7).
//!
//! Structurally grounded in the teacher's `budget/tracker.rs` (struct-with-
//! fields + exact-arithmetic unit tests); the dollar-based domain logic there
//! is not reused, this is a fresh implementation of the allocation math.

const DEFAULT_SYSTEM_PROMPT: usize = 2000;
const DEFAULT_USER_QUERY: usize = 500;
const DEFAULT_OUTPUT_CAP: usize = 2000;
const DEFAULT_SAFETY_MARGIN: f64 = 0.05;

/// The four top-level token counters (spec §3's "Token allocation").
///
/// `context_available` is kept as `f64`: the fractional remainder matters to
/// [`allocate_context`]'s per-component floor division (see the worked
/// example in spec §8 scenario 6 — 8192 tokens yields a nominal
/// `context_available = 3507`, but the components are computed against the
/// unrounded `3507.4`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBudget {
    pub system_prompt: usize,
    pub user_query: usize,
    pub output_buffer: usize,
    pub context_available: f64,
    pub safety_margin: f64,
}

impl TokenBudget {
    pub fn context_available_rounded(&self) -> usize {
        self.context_available as usize
    }
}

pub fn default_budget(total_tokens: usize) -> TokenBudget {
    let system_prompt = DEFAULT_SYSTEM_PROMPT;
    let output_buffer = (total_tokens / 4).min(DEFAULT_OUTPUT_CAP);
    let user_query = DEFAULT_USER_QUERY;
    let reserved = system_prompt + output_buffer + user_query;
    let remaining = total_tokens.saturating_sub(reserved) as f64;
    let context_available = (remaining * (1.0 - DEFAULT_SAFETY_MARGIN)).max(0.0);

    TokenBudget {
        system_prompt,
        user_query,
        output_buffer,
        context_available,
        safety_margin: DEFAULT_SAFETY_MARGIN,
    }
}

/// Component → priority weight. Higher wins more of `context_available`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentPriorities {
    pub schema: i64,
    pub examples: i64,
    pub business: i64,
    pub performance: i64,
}

impl Default for ComponentPriorities {
    fn default() -> Self {
        Self { schema: 10, examples: 7, business: 5, performance: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Schema,
    Examples,
    Business,
    Performance,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentAllocation {
    pub allocated: usize,
    pub used: usize,
    pub priority: i64,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub schema: ComponentAllocation,
    pub examples: ComponentAllocation,
    pub business: ComponentAllocation,
    pub performance: ComponentAllocation,
    /// `system_prompt + user_query + output_buffer + sum(component allocations)`.
    pub total: usize,
}

impl Allocation {
    fn get(&self, component: Component) -> &ComponentAllocation {
        match component {
            Component::Schema => &self.schema,
            Component::Examples => &self.examples,
            Component::Business => &self.business,
            Component::Performance => &self.performance,
        }
    }

    fn get_mut(&mut self, component: Component) -> &mut ComponentAllocation {
        match component {
            Component::Schema => &mut self.schema,
            Component::Examples => &mut self.examples,
            Component::Business => &mut self.business,
            Component::Performance => &mut self.performance,
        }
    }

    fn components_by_priority_desc(&self) -> Vec<Component> {
        let mut all = vec![Component::Schema, Component::Examples, Component::Business, Component::Performance];
        all.sort_by_key(|c| std::cmp::Reverse(self.get(*c).priority));
        all
    }
}

/// Apportion `budget.context_available` across components in proportion to
/// `priorities`. If every priority is zero, every component gets zero
/// (spec §4.7 — no arbitrary tie-break when there's no signal to rank by).
pub fn allocate_context(budget: &TokenBudget, priorities: ComponentPriorities) -> Allocation {
    let total_priority = priorities.schema + priorities.examples + priorities.business + priorities.performance;

    let component = |priority: i64| -> ComponentAllocation {
        if total_priority == 0 {
            return ComponentAllocation { allocated: 0, used: 0, priority, ratio: 0.0 };
        }
        let ratio = priority as f64 / total_priority as f64;
        let allocated = (budget.context_available * ratio).floor() as usize;
        ComponentAllocation { allocated, used: 0, priority, ratio }
    };

    let schema = component(priorities.schema);
    let examples = component(priorities.examples);
    let business = component(priorities.business);
    let performance = component(priorities.performance);

    let total = budget.system_prompt
        + budget.user_query
        + budget.output_buffer
        + schema.allocated
        + examples.allocated
        + business.allocated
        + performance.allocated;

    Allocation { schema, examples, business, performance, total }
}

/// Records `component`'s actual usage. If it came in under its allocation,
/// the surplus is handed to the other components in descending-priority
/// order — the highest-priority component that still has room absorbs it
/// first, so no single component's allocation can grow by more than the
/// surplus produced in this call.
pub fn adjust_for_actual_usage(allocation: &mut Allocation, component: Component, used: usize) {
    let entry = allocation.get_mut(component);
    entry.used = used;
    let surplus = entry.allocated.saturating_sub(used);
    if surplus == 0 {
        return;
    }

    let recipients: Vec<Component> =
        allocation.components_by_priority_desc().into_iter().filter(|c| *c != component).collect();

    let mut remaining = surplus;
    for recipient in recipients {
        if remaining == 0 {
            break;
        }
        let slot = allocation.get_mut(recipient);
        slot.allocated += remaining;
        remaining = 0;
    }
}

const REVENUE_TERMS: &[&str] = &["revenue", "profit", "customer", "order", "discount", "refund"];
const PERFORMANCE_TERMS: &[&str] = &["slow", "performance", "optimize", "fast", "index"];

/// Starts from [`ComponentPriorities::default`] and nudges weights based on
/// the query's apparent domain and whether the request is a retry after an
/// error (spec §4.7).
pub fn prioritize_components(query: &str, has_error: bool) -> ComponentPriorities {
    let mut p = ComponentPriorities::default();
    let lower = query.to_ascii_lowercase();

    if has_error {
        p.examples += 2;
        p.performance -= 1;
    }
    if REVENUE_TERMS.iter().any(|t| lower.contains(t)) {
        p.business = p.business.max(8);
    }
    if PERFORMANCE_TERMS.iter().any(|t| lower.contains(t)) {
        p.performance = p.performance.max(7);
    }
    p
}

/// `ceil(len_chars / 4) * 1.1`, rounded up again to a whole token count — a
/// 10% allowance for JSON/whitespace overhead around the raw text.
pub fn estimate_token_count(text: &str) -> usize {
    let chars = text.chars().count() as f64;
    let base = (chars / 4.0).ceil();
    (base * 1.1).ceil() as usize
}

const BREAK_CHARS: [char; 5] = ['\n', '.', ',', ';', ' '];
const TRUNCATION_SUFFIX: &str = "...[truncated]";
const BREAK_SEARCH_WINDOW: usize = 100;

/// Returns `text` unchanged if it already fits `max_tokens`; otherwise cuts
/// it down, backs up to the nearest natural break within the last
/// [`BREAK_SEARCH_WINDOW`] bytes so the result doesn't end mid-word, and
/// appends [`TRUNCATION_SUFFIX`].
pub fn truncate_to_budget(text: &str, max_tokens: usize) -> String {
    let estimate = estimate_token_count(text);
    if estimate <= max_tokens {
        return text.to_string();
    }

    let ratio = max_tokens as f64 / estimate as f64 * 0.95;
    let mut cut = ((text.len() as f64) * ratio).floor() as usize;
    cut = cut.min(text.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }

    let window_start = cut.saturating_sub(BREAK_SEARCH_WINDOW);
    let search_slice = &text[window_start..cut];
    let break_at = search_slice
        .char_indices()
        .rev()
        .find(|(_, c)| BREAK_CHARS.contains(c))
        .map(|(i, c)| window_start + i + c.len_utf8());

    let truncated = &text[..break_at.unwrap_or(cut)];
    format!("{truncated}{TRUNCATION_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_token_budget() {
        // spec §8 scenario 6.
        let budget = default_budget(8192);
        assert_eq!(budget.system_prompt, 2000);
        assert_eq!(budget.output_buffer, 2000);
        assert_eq!(budget.user_query, 500);
        assert_eq!(budget.context_available_rounded(), 3507);

        let allocation = allocate_context(&budget, ComponentPriorities::default());
        assert_eq!(allocation.schema.allocated, 1402);
        assert_eq!(allocation.examples.allocated, 982);
        assert_eq!(allocation.business.allocated, 701);
        assert_eq!(allocation.performance.allocated, 420);
    }

    #[test]
    fn zero_priority_allocates_zero_everywhere() {
        let budget = default_budget(8192);
        let zero = ComponentPriorities { schema: 0, examples: 0, business: 0, performance: 0 };
        let allocation = allocate_context(&budget, zero);
        assert_eq!(allocation.schema.allocated, 0);
        assert_eq!(allocation.examples.allocated, 0);
        assert_eq!(allocation.business.allocated, 0);
        assert_eq!(allocation.performance.allocated, 0);
    }

    #[test]
    fn allocation_never_exceeds_context_available_by_more_than_rounding() {
        let budget = default_budget(8192);
        let allocation = allocate_context(&budget, ComponentPriorities::default());
        let sum = allocation.schema.allocated + allocation.examples.allocated + allocation.business.allocated + allocation.performance.allocated;
        assert!((sum as f64) <= budget.context_available + 1.0);
    }

    #[test]
    fn surplus_flows_to_highest_priority_other_component() {
        let budget = default_budget(8192);
        let mut allocation = allocate_context(&budget, ComponentPriorities::default());
        let schema_before = allocation.schema.allocated;
        let examples_before = allocation.examples.allocated;

        // schema used far less than allocated -> its surplus should flow to
        // the next highest priority component, "examples".
        adjust_for_actual_usage(&mut allocation, Component::Schema, 100);
        let surplus = schema_before - 100;

        assert_eq!(allocation.schema.used, 100);
        assert_eq!(allocation.examples.allocated, examples_before + surplus);
        assert!(allocation.schema.allocated <= schema_before);
        assert!(allocation.examples.allocated <= examples_before + surplus);
    }

    #[test]
    fn prioritize_components_applies_error_and_keyword_nudges() {
        let base = prioritize_components("show me all users", false);
        assert_eq!(base, ComponentPriorities::default());

        let errored = prioritize_components("show me all users", true);
        assert_eq!(errored.examples, 9);
        assert_eq!(errored.performance, 2);

        let revenue = prioritize_components("total revenue by customer", false);
        assert_eq!(revenue.business, 8);

        let perf = prioritize_components("why is this query so slow", false);
        assert_eq!(perf.performance, 7);
    }

    #[test]
    fn estimate_token_count_matches_formula() {
        assert_eq!(estimate_token_count(""), 0);
        // 10 chars -> ceil(10/4)=3 -> 3*1.1=3.3 -> ceil 4
        assert_eq!(estimate_token_count("1234567890"), 4);
    }

    #[test]
    fn truncate_to_budget_is_noop_under_limit() {
        let text = "short text";
        assert_eq!(truncate_to_budget(text, 1000), text);
    }

    #[test]
    fn truncate_to_budget_cuts_and_backs_up_to_a_break() {
        let text = "the quick brown fox jumps over the lazy dog and keeps running ".repeat(20);
        let truncated = truncate_to_budget(&text, 10);
        assert!(truncated.ends_with(TRUNCATION_SUFFIX));
        assert!(truncated.len() < text.len());
    }
}
