//! Quiz and event commands

use anyhow::Result;
use chrono::{Duration, Utc};

use questline::activity::{Answer, Join, Leave, NewEvent, NewQuiz};
use questline::{Engine, UserId};

use crate::{EventCommand, QuizCommand};

pub async fn quiz_command(engine: &Engine, user: &UserId, command: QuizCommand) -> Result<()> {
    match command {
        QuizCommand::Create {
            question,
            answers,
            correct,
            points,
            achievement,
        } => {
            let quiz = engine
                .activities
                .create_quiz(
                    user,
                    NewQuiz {
                        question,
                        answers,
                        correct_answer_index: correct,
                        points,
                        achievement_id: achievement,
                    },
                )
                .await?;
            println!("Created quiz {} ({} points)", quiz.id, quiz.points);
        }
        QuizCommand::Answer { quiz_id, index } => {
            match engine.activities.submit_answer(user, &quiz_id, index).await? {
                Answer::Correct(report) => {
                    println!("Correct!");
                    super::print_report(&report);
                }
                Answer::Incorrect => println!("Sorry, that is not the right answer."),
            }
        }
    }
    Ok(())
}

pub async fn event_command(engine: &Engine, user: &UserId, command: EventCommand) -> Result<()> {
    match command {
        EventCommand::Create {
            title,
            description,
            location,
            in_days,
            price,
        } => {
            let event = engine
                .activities
                .create_event(
                    user,
                    NewEvent {
                        title,
                        description,
                        location,
                        date: Utc::now() + Duration::days(in_days),
                        price,
                    },
                )
                .await?;
            println!(
                "Created event {} on {}",
                event.id,
                event.date.format("%Y-%m-%d")
            );
        }
        EventCommand::Join { event_id } => {
            match engine.activities.join_event(user, &event_id).await? {
                Join::Joined { ticket, report } => {
                    match ticket {
                        Some(posting) => println!(
                            "Joined for {} points, balance {}",
                            -posting.transaction.amount,
                            posting.balance
                        ),
                        None => println!("Joined"),
                    }
                    super::print_report(&report);
                }
                Join::AlreadyJoined => println!("Already joined"),
            }
        }
        EventCommand::Leave { event_id } => {
            match engine.activities.leave_event(user, &event_id).await? {
                Leave::Left(report) => {
                    println!("Left event");
                    super::print_report(&report);
                }
                Leave::NotJoined => println!("Not a participant"),
            }
        }
    }
    Ok(())
}
