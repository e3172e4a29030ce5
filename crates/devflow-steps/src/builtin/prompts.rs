//! Prompt templates for the built-in steps.
//!
//! Review prompts ask the model to include an approval marker; the marker
//! is all that is read back from the reply.

pub const APPROVAL_MARKER: &str = "Approved";
pub const QA_PASSED_MARKER: &str = "QA Testing: Passed";

pub fn requirements(input: &str) -> String {
    format!(
        r#"You are a requirements analyst. Turn the request below into organized software requirements.

Request:
"{input}"

Cover:
1. Functional requirements (what the system must do)
2. Non-functional requirements (performance, security, usability and similar qualities)
3. Constraints (technical, business or regulatory limits)
4. Assumptions

Answer with a single JSON object whose keys are these four categories."#
    )
}

pub fn user_stories(requirements: &str, revision_feedback: Option<&str>) -> String {
    let revision = revision_feedback
        .map(|feedback| {
            format!(
                "Revision feedback:\n{feedback}\nAddress every point of this feedback in the revised stories.\n"
            )
        })
        .unwrap_or_default();
    format!(
        r#"You are a product manager writing user stories. Derive stories from the requirements below,
each in the form "As a [user role], I want [goal], so that [benefit]."

Requirements:
{requirements}

{revision}
For every story name the role, the goal and the benefit, and list acceptance criteria.
Group the stories by role and give each a priority (High, Medium, Low)."#
    )
}

pub fn review_user_stories(user_stories: &str) -> String {
    format!(
        r#"Review these user stories:
"{user_stories}"

Point out missing details, suggest improvements and check that each story is clear and complete.
If the stories meet these criteria, respond with '{APPROVAL_MARKER}'.
Otherwise list the revisions needed and mark the result 'Needs Revision'."#
    )
}

pub fn design(project_name: &str, user_stories: &str, revision_feedback: Option<&str>) -> String {
    let revision = revision_feedback
        .map(|feedback| format!("Reviewer feedback on the previous design:\n{feedback}\n"))
        .unwrap_or_default();
    format!(
        r#"You are a software architect. Write design documents for the project "{project_name}"
from these approved user stories.

User stories:
{user_stories}

{revision}
# Functional design
1. System overview
2. User interfaces, screen by screen
3. Data model: entities and relationships
4. Business logic and workflows
5. Integration points (APIs, external systems)

# Technical design
1. Architecture overview with a diagram description
2. Technology stack
3. Component design
4. Database schema
5. API specifications
6. Security considerations
7. Performance considerations
8. Deployment strategy

Be specific."#
    )
}

pub fn review_design(design_documents: &str) -> String {
    format!(
        r#"Review these design documents:

{design_documents}

Assess completeness, clarity, feasibility, scalability, security and maintainability.
If the design satisfies all of them, respond with '{APPROVAL_MARKER}'.
Otherwise suggest specific improvements and mark the result 'Needs Revision'."#
    )
}

pub fn generate_code(project_name: &str, design_documents: &str) -> String {
    format!(
        r#"You are a senior software developer. Implement the project "{project_name}" from these design documents.

Design documents:
{design_documents}

Provide the directory layout, every key source file in full, dependency and configuration files,
and a README.md with setup and usage instructions.
Put each file in its own fenced block and write the file path right after the opening fence,
for example ```src/main.py, followed by a short note on what the file does."#
    )
}

pub fn review_code(code: &str) -> String {
    format!(
        r#"Review this code:

{code}

Check correctness, code quality, performance, security and adherence to common practice.
For each issue give the file and line, describe it and propose a fix.
If the code passes every check, respond with '{APPROVAL_MARKER}'.
Otherwise list all issues and mark the result 'Needs Revision'."#
    )
}

pub fn fix_code(code: &str, feedback: &str) -> String {
    format!(
        r#"Fix this code using the review feedback.

Current code:
{code}

Review feedback:
{feedback}

Return every changed file in full, each in its own fenced block with the file path after the
opening fence, and explain the changes."#
    )
}

pub fn security_review(code: &str) -> String {
    format!(
        r#"You are an application security reviewer. Audit this code:

{code}

Look for injection flaws, broken authentication or authorization, sensitive data exposure,
XML external entities, broken access control, security misconfiguration, cross-site scripting,
insecure deserialization, vulnerable dependencies and insufficient logging.
For each finding give the file and line, a description, a severity (Critical, High, Medium, Low)
and a fix.
If nothing is found, respond with '{APPROVAL_MARKER}'.
Otherwise list the vulnerabilities and mark the result 'Needs Security Fixes'."#
    )
}

pub fn fix_security(code: &str, feedback: &str) -> String {
    format!(
        r#"Fix the security vulnerabilities reported for this code.

Current code:
{code}

Security findings:
{feedback}

Return every changed file in full, each in its own fenced block with the file path after the
opening fence, and explain each fix."#
    )
}

pub fn write_test_cases(user_stories: &str, code: &str) -> String {
    format!(
        r#"You are a QA engineer writing test cases for the code below, guided by the user stories.

User stories:
{user_stories}

Code:
{code}

Write unit tests (each function, positive, negative and edge cases), integration tests
(component interaction, API endpoints, storage) and end-to-end tests (complete user workflows).
For each test give an id, description, preconditions, steps, expected result, test data and the
test code. Put test code files in fenced blocks with the file path after the opening fence."#
    )
}

pub fn review_test_cases(test_cases: &str) -> String {
    format!(
        r#"Review these test cases:

{test_cases}

Judge coverage, completeness, quality, edge cases and negative testing.
If the tests meet all of these, respond with '{APPROVAL_MARKER}'.
Otherwise suggest specific improvements and mark the result 'Needs Revision'."#
    )
}

pub fn fix_test_cases(test_cases: &str, feedback: &str) -> String {
    format!(
        r#"Revise these test cases to address the review feedback.

Current test cases:
{test_cases}

Review feedback:
{feedback}

Return the updated test cases with id, description, preconditions, steps, expected result,
test data and test code, and explain the changes."#
    )
}

pub fn qa_testing(code: &str, test_cases: &str) -> String {
    format!(
        r#"You are a QA tester. Simulate running the test cases against the code and report the results.

Code:
{code}

Test cases:
{test_cases}

For each test decide whether it passes and explain why; for failures point at the faulty code.
Finish with the totals: tests run, passed, failed and pass rate.
If every test passes, respond with '{QA_PASSED_MARKER}'.
Otherwise list the failed tests and respond with 'QA Testing: Failed'."#
    )
}

pub fn fix_after_qa(code: &str, qa_results: &str) -> String {
    format!(
        r#"Fix this code using the QA results.

Current code:
{code}

QA results:
{qa_results}

Return every changed file in full, each in its own fenced block with the file path after the
opening fence, and explain the fixes."#
    )
}

pub fn deployment(project_name: &str, code: &str) -> String {
    format!(
        r#"You are a DevOps engineer. Plan the deployment of the project "{project_name}".

Code:
{code}

Cover the deployment approach and environments (dev, staging, production), the CI/CD pipeline,
infrastructure as code (containers, manifests or templates as applicable), step-by-step deployment
and rollback instructions with required environment variables, and monitoring and log setup.
Put each configuration file in a fenced block with the file path after the opening fence."#
    )
}

pub fn monitoring(project_name: &str, deployment_status: &str) -> String {
    format!(
        r#"You are a site reliability engineer. Write a monitoring and feedback plan for the deployed project "{project_name}".

Deployment status:
{deployment_status}

Cover key metrics and error tracking, alert thresholds and escalation, how user feedback is
collected and prioritized, and the continuous improvement loop."#
    )
}

pub fn maintenance(project_name: &str, user_stories: &str, code: &str, monitoring_data: &str) -> String {
    format!(
        r#"You are a software maintenance engineer. Using the monitoring data and user feedback, write a
maintenance and update plan for the project "{project_name}".

Original user stories:
{user_stories}

Current code:
{code}

Monitoring data and user feedback:
{monitoring_data}

Cover issue analysis with priorities and root causes, improvement recommendations, a maintenance
schedule with technical debt reduction, and the implementation and rollout plan for updates."#
    )
}
