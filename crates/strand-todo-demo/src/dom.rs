#![forbid(unsafe_code)]

//! The application's DOM skeleton, kept as named handles so application
//! code and tests can reach the interactive elements directly.

use strand_dom::Element;

/// The Todo app skeleton.
pub struct TodoDom {
    pub root: Element,
    pub new_todo: Element,
    pub toggle_all: Element,
    pub todo_list: Element,
    pub clear_completed: Element,
    /// Filter links, as (fragment, element) pairs: `""`, `"active"`,
    /// `"completed"`.
    pub filters: Vec<(String, Element)>,
}

impl TodoDom {
    /// Build the classic header/main/footer structure.
    #[must_use]
    pub fn build() -> Self {
        let new_todo = Element::new("input")
            .with_id("new-todo")
            .with_attr("placeholder", "What needs to be done?")
            .with_attr("st-onkeydown", "createOnEnter");

        let toggle_all = Element::new("input")
            .with_id("toggle-all")
            .with_attr("type", "checkbox")
            .with_attr("st-bind", "allChecked")
            .with_attr("st-onchange", "toggleAllComplete");

        let todo_list = Element::new("ul").with_id("todo-list");

        let clear_completed = Element::new("button")
            .with_id("clear-completed")
            .with_attr("st-show", "hasCompleted")
            .with_attr("st-onclick", "clearCompleted")
            .with_text("Clear completed");

        let filters: Vec<(String, Element)> = [("", "All"), ("active", "Active"), ("completed", "Completed")]
            .into_iter()
            .map(|(fragment, label)| {
                let link = Element::new("a")
                    .with_attr("href", format!("#/{fragment}"))
                    .with_text(label);
                (fragment.to_owned(), link)
            })
            .collect();

        let filter_list = {
            let list = Element::new("ul").with_id("filters");
            for (_, link) in &filters {
                list.append_child(&Element::new("li").with_child(link.clone()));
            }
            list
        };

        let root = Element::new("section")
            .with_id("todoapp")
            .with_child(Element::new("header").with_id("header").with_child(new_todo.clone()))
            .with_child(
                Element::new("section")
                    .with_id("main")
                    .with_attr("st-show", "mainVisible")
                    .with_child(toggle_all.clone())
                    .with_child(todo_list.clone()),
            )
            .with_child(
                Element::new("footer")
                    .with_id("footer")
                    .with_attr("st-show", "footerVisible")
                    .with_child(
                        Element::new("span")
                            .with_id("todo-count")
                            .with_child(Element::new("strong").with_attr("st-text", "remaining"))
                            .with_child(
                                Element::new("span")
                                    .with_attr("st-text", "remaining|itemOrItems"),
                            ),
                    )
                    .with_child(filter_list)
                    .with_child(clear_completed.clone()),
            );

        Self {
            root,
            new_todo,
            toggle_all,
            todo_list,
            clear_completed,
            filters,
        }
    }

    /// The rendered todo item elements, in list order.
    #[must_use]
    pub fn items(&self) -> Vec<Element> {
        self.todo_list.children()
    }
}
