/// Default cover letter prompt. Placeholders: {score}, {key_matches},
/// {missing_skills}, {reasoning}, {job_title}, {company}, {location},
/// {description}, {resume}.
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a compelling, personalized cover letter that emphasizes the candidate's matching skills.

SCORING INSIGHTS:
Relevance Score: {score}/100
Key Strengths: {key_matches}
Areas to Address: {missing_skills}
Reasoning: {reasoning}

JOB DETAILS:
Title: {job_title}
Company: {company}
Location: {location}
Description:
{description}

CANDIDATE RESUME:
{resume}

INSTRUCTIONS:
1. Start with exactly one greeting line: "Dear {company} Hiring Team,"
2. Write 1-2 body paragraphs (150-200 words total) built around the key strengths
3. Give specific examples of achievements from the resume
4. If a missing skill is learnable, express enthusiasm to learn it
5. Close with "Regards," followed by the candidate's name

FORMAT:
- Professional but personable tone
- No placeholders or brackets
- HTML with <p> tags
- Do NOT include resume links, job links, or any other URLs"#;

pub const ATTACHED_RESUME_NOTICE: &str = "\n<p><br></p>\n<p><em>I have attached my resume for your review. I look forward to discussing this opportunity further.</em></p>";

pub const CLOSING_NOTICE: &str =
    "\n<p><br></p>\n<p><em>I look forward to discussing this opportunity further.</em></p>";
